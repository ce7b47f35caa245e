//! Poseidon Derivations
//!
//! Every derivation absorbs a domain separator first, then its inputs:
//!
//! ```text
//! nonce_i        = H(NONCE,   first_nullifier, i)
//! inner          = H(NOTE,    storage_slot, note_type_id, items...)
//! unique         = H(UNIQUE,  nonce, inner)
//! siloed         = H(SILO_NH, contract, unique)
//! inner_null     = H(NULL,    unique, nsk)
//! siloed_null    = H(SILO_NF, contract, inner_null)
//! address_secret = H(ADDR_SK, preaddress, ivsk)
//! ```

use std::sync::LazyLock;

use ark_bls12_381::Fr;
use ark_crypto_primitives::sponge::{
    CryptographicSponge,
    poseidon::{PoseidonConfig, PoseidonSponge, find_poseidon_ark_and_mds},
};

use crate::field::Field;

pub mod domain {
    //! Domain separators (ASCII tags packed into a u64)

    pub const NOTE_HASH_NONCE: u64 = 0x6e6f6e6365; // "nonce"
    pub const NOTE_HASH: u64 = 0x6e6f7465; // "note"
    pub const UNIQUE_NOTE_HASH: u64 = 0x756e69717565; // "unique"
    pub const SILOED_NOTE_HASH: u64 = 0x73696c6f6e68; // "silonh"
    pub const INNER_NULLIFIER: u64 = 0x6e756c6c; // "null"
    pub const SILOED_NULLIFIER: u64 = 0x73696c6f6e66; // "silonf"
    pub const ADDRESS_SECRET: u64 = 0x6164647273; // "addrs"
    pub const ADDRESS_POINT: u64 = 0x6164647270; // "addrp"
    pub const PREADDRESS: u64 = 0x70726561; // "prea"
    pub const ADDRESS: u64 = 0x61646472; // "addr"
    pub const PUBLIC_KEYS: u64 = 0x706b73; // "pks"
    pub const MASTER_KEY: u64 = 0x6d6b; // "mk"
    pub const CONTRACT_CLASS: u64 = 0x636c617373; // "class"
    pub const CONTRACT_ADDRESS: u64 = 0x6361646472; // "caddr"
    pub const TX_HASH: u64 = 0x7478; // "tx"
    pub const TX_REQUEST: u64 = 0x7478726571; // "txreq"
    pub const FIRST_NULLIFIER: u64 = 0x66697273746e; // "firstn"
}

/// Poseidon configuration for Zelana
///
/// Field: BLS12-381 Fr (255 bits)
/// Rate: 2, Capacity: 1
static POSEIDON: LazyLock<PoseidonConfig<Fr>> = LazyLock::new(|| {
    let prime_bits: u64 = 255;
    let rate: usize = 2;
    let capacity: usize = 1;
    let full_rounds: u64 = 8;
    let partial_rounds: u64 = 57;
    let alpha: u64 = 5;
    let skip_matrices: u64 = 0;

    let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
        prime_bits,
        rate,
        full_rounds,
        partial_rounds,
        skip_matrices,
    );

    PoseidonConfig::new(
        full_rounds as usize,
        partial_rounds as usize,
        alpha,
        mds,
        ark,
        rate,
        capacity,
    )
});

/// Domain-separated Poseidon hash over field elements
pub fn poseidon_hash(domain: u64, inputs: &[Field]) -> Field {
    let mut sponge = PoseidonSponge::new(&POSEIDON);
    sponge.absorb(&Fr::from(domain));
    for input in inputs {
        sponge.absorb(&input.to_fr());
    }
    let result: Fr = sponge.squeeze_field_elements(1)[0];
    Field::from_fr(result)
}

/// Map arbitrary bytes into the field (blake3, then reduce)
pub fn hash_to_field(bytes: &[u8]) -> Field {
    Field::from_be_bytes_mod_order(blake3::hash(bytes).as_bytes())
}

pub fn compute_note_hash_nonce(first_nullifier: Field, index: usize) -> Field {
    poseidon_hash(
        domain::NOTE_HASH_NONCE,
        &[first_nullifier, Field::from_u64(index as u64)],
    )
}

/// Inner note hash over the note's storage slot, type and content
pub fn compute_note_hash(storage_slot: Field, note_type_id: Field, items: &[Field]) -> Field {
    let mut inputs = Vec::with_capacity(items.len() + 2);
    inputs.push(storage_slot);
    inputs.push(note_type_id);
    inputs.extend_from_slice(items);
    poseidon_hash(domain::NOTE_HASH, &inputs)
}

pub fn compute_unique_note_hash(nonce: Field, note_hash: Field) -> Field {
    poseidon_hash(domain::UNIQUE_NOTE_HASH, &[nonce, note_hash])
}

pub fn silo_note_hash(contract: Field, unique_note_hash: Field) -> Field {
    poseidon_hash(domain::SILOED_NOTE_HASH, &[contract, unique_note_hash])
}

pub fn compute_inner_nullifier(unique_note_hash: Field, nullifier_secret: Field) -> Field {
    poseidon_hash(domain::INNER_NULLIFIER, &[unique_note_hash, nullifier_secret])
}

pub fn silo_nullifier(contract: Field, inner_nullifier: Field) -> Field {
    poseidon_hash(domain::SILOED_NULLIFIER, &[contract, inner_nullifier])
}

/// Address-specific incoming viewing secret
pub fn compute_address_secret(preaddress: Field, ivsk: Field) -> Field {
    poseidon_hash(domain::ADDRESS_SECRET, &[preaddress, ivsk])
}
