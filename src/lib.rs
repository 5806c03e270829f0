//! Legacy SMB/CIFS password hashes for Rust.
//!
//! Computes the LAN Manager (LM) and NTLMv1 challenge responses as well as the legacy
//! username/domain-bound NTLMv2 hash from a plaintext password and the 8-byte challenge sent by
//! the server during session setup.
//!
//! Sample usage:
//! ```
//! use smbhash::{HashVariant, compute_response};
//!
//! // obtained from the server's negotiate response
//! let challenge = [0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef];
//!
//! let lm = compute_response("Password", &challenge, HashVariant::Lanman, None, None)
//!     .expect("failed to compute LM response");
//! let nt = compute_response("Password", &challenge, HashVariant::Ntlm1, None, None)
//!     .expect("failed to compute NTLMv1 response");
//! let v2 = compute_response("Password", &challenge, HashVariant::Ntlm2, Some("User"), Some("Domain"))
//!     .expect("failed to compute NTLMv2 hash");
//!
//! assert_eq!(lm.len(), 24);
//! assert_eq!(nt.len(), 24);
//! assert_eq!(v2.len(), 16);
//! ```
//!
//! All functions are pure; a fresh cipher or MAC state is created for every block, so they may be
//! called from any number of threads at once.


#[cfg(windows)]
mod encoding_windows;

#[cfg(not(windows))]
mod encoding_latin1;


use std::fmt;

use cipher::{BlockEncrypt, KeyInit};
use cipher::generic_array::GenericArray;
use cipher::generic_array::typenum::U8;
use des::Des;
use digest::Digest;
use hmac::{Hmac, Mac};
use log::{debug, trace, warn};
use md4::Md4;
use md5::Md5;

#[cfg(windows)]
use crate::encoding_windows::rust_string_to_oem;

#[cfg(not(windows))]
use crate::encoding_latin1::rust_string_to_oem;


/// The well-known plaintext encrypted by the LAN Manager one-way function.
pub const LM_MAGIC: [u8; 8] = *b"KGS!@#$%";

/// The length of a server challenge.
pub const CHALLENGE_LEN: usize = 8;

/// The number of password bytes considered by the LAN Manager scheme.
const P14_LEN: usize = 14;


/// The kind of encrypted password to compute.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum HashVariant {
    /// The LAN Manager challenge response (24 bytes).
    Lanman,

    /// The NTLMv1 challenge response (24 bytes).
    Ntlm1,

    /// The legacy NTLMv2 hash, bound to username and domain (16 bytes).
    Ntlm2,

    /// The MD4 hash of the password (16 bytes); the challenge is not involved.
    Md4Raw,
}
impl HashVariant {
    /// All variants, ordered by their numeric code.
    pub const ALL: [HashVariant; 4] = [Self::Lanman, Self::Ntlm1, Self::Ntlm2, Self::Md4Raw];

    /// Returns the numeric code identifying this variant on the wire and in configuration.
    pub fn code(&self) -> i32 {
        match self {
            Self::Lanman => 0,
            Self::Ntlm1 => 1,
            Self::Ntlm2 => 2,
            Self::Md4Raw => 3,
        }
    }

    /// Returns the human-readable name of this variant.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Lanman => "LanMan",
            Self::Ntlm1 => "NTLMv1",
            Self::Ntlm2 => "NTLMv2",
            Self::Md4Raw => "MD4",
        }
    }

    /// Returns the length of the output produced for this variant.
    pub fn output_len(&self) -> usize {
        match self {
            Self::Lanman|Self::Ntlm1 => 24,
            Self::Ntlm2|Self::Md4Raw => 16,
        }
    }
}
impl fmt::Display for HashVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
impl TryFrom<i32> for HashVariant {
    type Error = HashingError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Self::ALL.iter()
            .copied()
            .find(|v| v.code() == code)
            .ok_or(HashingError::PreconditionViolation(Precondition::UnknownVariant { code }))
    }
}

/// Returns the name of the variant with the given numeric code, or `"Unknown"`.
pub fn algorithm_name(code: i32) -> &'static str {
    HashVariant::try_from(code)
        .map(|v| v.name())
        .unwrap_or("Unknown")
}


/// A cryptographic primitive used by the hashing engine.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Algorithm {
    Des,
    Md4,
    HmacMd5,
}
impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Des => write!(f, "DES"),
            Self::Md4 => write!(f, "MD4"),
            Self::HmacMd5 => write!(f, "HMAC-MD5"),
        }
    }
}


/// A requirement on the inputs that the caller failed to meet.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Precondition {
    /// The NTLMv2 hash was requested without a username.
    MissingUsername,

    /// The NTLMv2 hash was requested without a domain.
    MissingDomain,

    /// The challenge does not have exactly 8 bytes.
    ChallengeLength { obtained: usize },

    /// A numeric variant code does not name any variant.
    UnknownVariant { code: i32 },

    /// The password cannot be represented in the single-byte encoding.
    UnencodablePassword,
}
impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingUsername
                => write!(f, "a username is required for the NTLMv2 hash"),
            Self::MissingDomain
                => write!(f, "a domain is required for the NTLMv2 hash"),
            Self::ChallengeLength { obtained }
                => write!(f, "challenge must be {} bytes long, obtained {}", CHALLENGE_LEN, obtained),
            Self::UnknownVariant { code }
                => write!(f, "unknown hash variant code {}", code),
            Self::UnencodablePassword
                => write!(f, "password cannot be encoded using the OEM encoding"),
        }
    }
}

/// An error that may occur while computing an encrypted password.
///
/// Any of these means the password cannot be sent using the requested variant; the caller should
/// abort or negotiate a different one, never send a zeroed hash.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum HashingError {
    /// A cryptographic primitive does not behave as required.
    AlgorithmUnavailable { algorithm: Algorithm },

    /// The key material was rejected by the cipher or MAC.
    InvalidKey { algorithm: Algorithm, length: usize },

    /// The inputs do not meet the requirements of the operation.
    PreconditionViolation(Precondition),
}
impl fmt::Display for HashingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlgorithmUnavailable { algorithm }
                => write!(f, "algorithm {} is unavailable", algorithm),
            Self::InvalidKey { algorithm, length }
                => write!(f, "invalid {} key of length {}", algorithm, length),
            Self::PreconditionViolation(p)
                => write!(f, "precondition violated: {}", p),
        }
    }
}
impl std::error::Error for HashingError {
}
impl From<Precondition> for HashingError {
    fn from(p: Precondition) -> Self {
        Self::PreconditionViolation(p)
    }
}


// primitives


/// Spreads the 56 bits of the 7 bytes at `offset` in `source` over an 8-byte DES key.
///
/// Each key byte receives 7 bits of the source in its upper bits; the lowest (parity) bit is
/// always zero.
///
/// # Panics
///
/// Panics if `source` is shorter than `offset + 7`.
pub fn derive_key(source: &[u8], offset: usize) -> [u8; 8] {
    let s = &source[offset..offset+7];
    trace!("deriving DES key from bytes {}..{}", offset, offset + 7);

    let mut key = [
        s[0] >> 1,
        ((s[0] & 0x01) << 6) | (s[1] >> 2),
        ((s[1] & 0x03) << 5) | (s[2] >> 3),
        ((s[2] & 0x07) << 4) | (s[3] >> 4),
        ((s[3] & 0x0F) << 3) | (s[4] >> 5),
        ((s[4] & 0x1F) << 2) | (s[5] >> 6),
        ((s[5] & 0x3F) << 1) | (s[6] >> 7),
        s[6] & 0x7F,
    ];
    for b in key.iter_mut() {
        *b <<= 1;
    }
    key
}

/// Encrypts a single block with DES in ECB mode, without padding.
///
/// The key parity bits are not checked.
pub fn des_encrypt_block(key: &[u8], block: &[u8; 8]) -> Result<[u8; 8], HashingError> {
    let des_state = Des::new_from_slice(key)
        .or(Err(HashingError::InvalidKey { algorithm: Algorithm::Des, length: key.len() }))?;

    let mut buf: GenericArray<u8, U8> = GenericArray::from(*block);
    des_state.encrypt_block(&mut buf);
    trace!("encrypted one DES block");

    let mut ret = [0u8; 8];
    ret.copy_from_slice(buf.as_slice());
    Ok(ret)
}

/// Calculates the MD4 digest of the given bytes.
pub fn md4_digest(data: &[u8]) -> [u8; 16] {
    let mut md4_state = <Md4 as Digest>::new();
    md4_state.update(data);

    let mut ret = [0u8; 16];
    ret.copy_from_slice(md4_state.finalize().as_slice());
    ret
}

/// Calculates the HMAC-MD5 of the concatenation of `parts` under `key`.
pub fn hmac_md5(key: &[u8], parts: &[&[u8]]) -> Result<[u8; 16], HashingError> {
    let mut hmac_state: Hmac<Md5> = <Hmac<Md5> as Mac>::new_from_slice(key)
        .or(Err(HashingError::InvalidKey { algorithm: Algorithm::HmacMd5, length: key.len() }))?;
    for part in parts {
        hmac_state.update(part);
    }

    let mut ret = [0u8; 16];
    ret.copy_from_slice(hmac_state.finalize().into_bytes().as_slice());
    Ok(ret)
}

/// Encodes the string as UTF-16 in little-endian byte order, without the Byte Order Mark.
fn utf16_le_bytes(s: &str) -> Vec<u8> {
    s.encode_utf16()
        .flat_map(|w| w.to_le_bytes())
        .collect()
}

fn challenge_from_slice(challenge: &[u8]) -> Result<[u8; CHALLENGE_LEN], HashingError> {
    challenge.try_into()
        .or(Err(HashingError::from(Precondition::ChallengeLength { obtained: challenge.len() })))
}


// self-check


const DES_CHECK_KEY: [u8; 8] = [0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF];
const DES_CHECK_PLAINTEXT: [u8; 8] = *b"Now is t";
const DES_CHECK_CIPHERTEXT: [u8; 8] = [0x3F, 0xA4, 0x0E, 0x8A, 0x98, 0x4D, 0x48, 0x15];

const MD4_CHECK_INPUT: &[u8] = b"abc";
const MD4_CHECK_DIGEST: [u8; 16] = [
    0xA4, 0x48, 0x01, 0x7A, 0xAF, 0x21, 0xD8, 0x52, 0x5F, 0xC1, 0x0A, 0xE8, 0x7A, 0xA6, 0x72, 0x9D,
];

const HMAC_MD5_CHECK_KEY: [u8; 16] = [0x0B; 16];
const HMAC_MD5_CHECK_INPUT: &[u8] = b"Hi There";
const HMAC_MD5_CHECK_MAC: [u8; 16] = [
    0x92, 0x94, 0x72, 0x7A, 0x36, 0x38, 0xBB, 0x1C, 0x13, 0xF4, 0x8E, 0xF8, 0x15, 0x8B, 0xFC, 0x9D,
];


/// Verifies DES, MD4 and HMAC-MD5 against published known-answer vectors.
///
/// Returns the first algorithm that does not reproduce its vector.
pub fn check_algorithms() -> Result<(), HashingError> {
    let des_ok = des_encrypt_block(&DES_CHECK_KEY, &DES_CHECK_PLAINTEXT)
        .map(|ct| ct == DES_CHECK_CIPHERTEXT)
        .unwrap_or(false);
    if !des_ok {
        warn!("DES known-answer check failed");
        return Err(HashingError::AlgorithmUnavailable { algorithm: Algorithm::Des });
    }

    if md4_digest(MD4_CHECK_INPUT) != MD4_CHECK_DIGEST {
        warn!("MD4 known-answer check failed");
        return Err(HashingError::AlgorithmUnavailable { algorithm: Algorithm::Md4 });
    }

    let hmac_ok = hmac_md5(&HMAC_MD5_CHECK_KEY, &[HMAC_MD5_CHECK_INPUT])
        .map(|mac| mac == HMAC_MD5_CHECK_MAC)
        .unwrap_or(false);
    if !hmac_ok {
        warn!("HMAC-MD5 known-answer check failed");
        return Err(HashingError::AlgorithmUnavailable { algorithm: Algorithm::HmacMd5 });
    }

    Ok(())
}

/// Returns whether all algorithms required for password hashing work correctly.
pub fn algorithms_available() -> bool {
    check_algorithms().is_ok()
}


// chaining


/// Converts the password into the 14-byte LAN Manager key material.
///
/// The password is converted to uppercase, encoded using the single-byte OEM encoding, and then
/// truncated or zero-padded to 14 bytes.
fn p14(password: &str) -> Result<[u8; P14_LEN], HashingError> {
    let uppercase_password = password.to_uppercase();
    let password_bytes = rust_string_to_oem(&uppercase_password)
        .ok_or(HashingError::from(Precondition::UnencodablePassword))?;

    let mut ret = [0u8; P14_LEN];
    let len = password_bytes.len().min(P14_LEN);
    ret[..len].copy_from_slice(&password_bytes[..len]);
    Ok(ret)
}

/// Encrypts `seed` under both halves of the password's 14-byte LAN Manager key material.
///
/// ```plain
///            ┌────────────┐  ┌───────────────┐  ┌─────────────┐
/// password ──┤ convert to ├──┤ encode using  ├──┤ truncate or ├──┐
///            │ uppercase  │  │ OEM codepage  │  │ pad to 14 B │  │
///            └────────────┘  └───────────────┘  └─────────────┘  │
///           ┌────────────────────────────────────────────────────┘
///           │┌───────┐
///           └┤ split │             seed
///            └─┬───┬─┘               │ input
///         0..7 │   │ 7..14    key ┌──┴──┐ output
///              │   └──────────────┤ DES ├────────────┐
///              │                  └─────┘            │ 8..16
///              │                                  ┌──┴───┐
///              │                   seed           │ join ├──── P16
///              │                     │ input      └──┬───┘
///              │              key ┌──┴──┐ output     │ 0..8
///              └──────────────────┤ DES ├────────────┘
///                                 └─────┘
/// ```
///
/// Passwords longer than 14 bytes are silently truncated.
pub fn p16(password: &str, seed: &[u8; 8]) -> Result<[u8; 16], HashingError> {
    let p14 = p14(password)?;

    let mut output = [0u8; 16];
    let (half0, half1) = output.split_at_mut(8);
    half0.copy_from_slice(&des_encrypt_block(&derive_key(&p14, 0), seed)?);
    half1.copy_from_slice(&des_encrypt_block(&derive_key(&p14, 7), seed)?);
    Ok(output)
}

/// Calculates the LAN Manager hash of the password, i.e. [`p16`] over [`LM_MAGIC`].
pub fn lm_base_hash(password: &str) -> Result<[u8; 16], HashingError> {
    p16(password, &LM_MAGIC)
}

/// Zero-extends a 16-byte hash to the 21 bytes consumed by [`p24_from_p21`].
pub fn p21_from_hash(hash: &[u8; 16]) -> [u8; 21] {
    let mut p21 = [0u8; 21];
    p21[..16].copy_from_slice(hash);
    p21
}

/// Encrypts the challenge under each of the three 7-byte thirds of `p21`.
pub fn p24_from_p21(p21: &[u8; 21], challenge: &[u8; 8]) -> Result<[u8; 24], HashingError> {
    let mut ret = [0u8; 24];
    for (offset, out) in (0..21).step_by(7).zip(ret.chunks_exact_mut(8)) {
        out.copy_from_slice(&des_encrypt_block(&derive_key(p21, offset), challenge)?);
    }
    Ok(ret)
}

/// Calculates the LAN Manager response to the challenge directly from the password.
pub fn p24(password: &str, challenge: &[u8; 8]) -> Result<[u8; 24], HashingError> {
    let p21 = p21_from_hash(&lm_base_hash(password)?);
    p24_from_p21(&p21, challenge)
}


// response calculation functions


/// Calculates the MD4 hash of the password encoded as UTF-16LE (the NT hash).
fn md4_password_hash(password: &str) -> [u8; 16] {
    md4_digest(&utf16_le_bytes(password))
}

/// Calculates the LAN Manager response from a previously computed (zero-extended) LM hash.
pub fn lm_response_from_p21(p21: &[u8; 21], challenge: &[u8; 8]) -> Result<[u8; 24], HashingError> {
    p24_from_p21(p21, challenge)
}

/// Calculates the NTLMv1 response from a previously computed (zero-extended) MD4 password hash.
pub fn ntlm1_response_from_p21(p21: &[u8; 21], challenge: &[u8; 8]) -> Result<[u8; 24], HashingError> {
    p24_from_p21(p21, challenge)
}

/// Calculates the NTLMv2 hash from a previously computed MD4 password hash.
///
/// The username is converted to uppercase; the domain is used as given. Both are encoded as
/// UTF-16LE.
pub fn ntlm2_response_from_hash(md4_hash: &[u8; 16], username: &str, domain: &str) -> Result<[u8; 16], HashingError> {
    let upper_user_bytes = utf16_le_bytes(&username.to_uppercase());
    let dom_bytes = utf16_le_bytes(domain);
    hmac_md5(md4_hash, &[upper_user_bytes.as_slice(), dom_bytes.as_slice()])
}

/// Computes the encrypted password for the given variant.
///
/// `username` and `domain` are required for [`HashVariant::Ntlm2`] and ignored otherwise; in
/// that variant, both are converted to uppercase before hashing. The challenge must be 8 bytes
/// long for every variant, even [`HashVariant::Md4Raw`] which does not use it.
///
/// The length of the result is given by [`HashVariant::output_len`].
pub fn compute_response(
    password: &str,
    challenge: &[u8],
    variant: HashVariant,
    username: Option<&str>,
    domain: Option<&str>,
) -> Result<Vec<u8>, HashingError> {
    let challenge = challenge_from_slice(challenge)?;
    debug!("computing {} encrypted password", variant);

    match variant {
        HashVariant::Lanman => {
            Ok(Vec::from(p24(password, &challenge)?))
        },
        HashVariant::Ntlm1 => {
            let p21 = p21_from_hash(&md4_password_hash(password));
            Ok(Vec::from(ntlm1_response_from_p21(&p21, &challenge)?))
        },
        HashVariant::Ntlm2 => {
            let username = username.ok_or(Precondition::MissingUsername)?;
            let domain = domain.ok_or(Precondition::MissingDomain)?;

            let hmac_key = md4_password_hash(password);
            let mut user_domain = username.to_uppercase();
            user_domain.push_str(&domain.to_uppercase());
            let user_domain_bytes = utf16_le_bytes(&user_domain);
            Ok(Vec::from(hmac_md5(&hmac_key, &[user_domain_bytes.as_slice()])?))
        },
        HashVariant::Md4Raw => {
            Ok(Vec::from(md4_password_hash(password)))
        },
    }
}
