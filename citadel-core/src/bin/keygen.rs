//! Attestation Key Generation Utility
//!
//! Generates an Ed25519 keypair and outputs both halves in hex, plus the
//! public fingerprint used as `public_key_id` in manifests.
//!
//! Usage:
//!   cargo run --bin keygen
//!   cargo run --bin keygen -- --name attest
//!
//! Output (to stdout):
//!   export ATTEST_PRIVATE_KEY=<hex>
//!   export ATTEST_PUBLIC_KEY=<hex>
//!   export ATTEST_KEY_ID=<fingerprint>

use citadel_core::SigningKey;
use std::env;

fn main() {
    let args: Vec<String> = env::args().collect();
    let name = if args.len() > 2 && args[1] == "--name" {
        args[2].to_uppercase()
    } else {
        "KEY".to_string()
    };

    let key = SigningKey::generate();
    let public = key.public_key();

    println!(
        "export {}_PRIVATE_KEY={}",
        name,
        hex::encode(key.secret_key_bytes())
    );
    println!("export {}_PUBLIC_KEY={}", name, hex::encode(public.to_bytes()));
    println!("export {}_KEY_ID={}", name, public.fingerprint());
}
