#![forbid(unsafe_code)]

use std::fmt;

use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::Rng;
use sha2::Sha256;
use ticket_defense_contracts::case::{
    CaseDraft, TrackingCode, VerifierHash, MAX_TRACKING_CODE_ATTEMPTS, TRACKING_CODE_ALPHABET,
    TRACKING_CODE_LEN,
};

type HmacSha256 = Hmac<Sha256>;

const VERIFIER_MASK: &str = "••••";

/// Last four digits of a phone number, or an empty string when fewer than
/// four digits are present.
pub fn normalize_last4(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < 4 {
        return String::new();
    }
    digits[digits.len() - 4..].iter().collect()
}

/// HMAC-SHA256 of the verifier keyed by the server-side pepper, hex encoded.
pub fn hash_verifier(last4: &str, pepper: &str) -> VerifierHash {
    // HMAC accepts keys of any length, including empty.
    let mut mac = match HmacSha256::new_from_slice(pepper.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("hmac-sha256 accepts keys of any length"),
    };
    mac.update(last4.as_bytes());
    let digest = hex::encode(mac.finalize().into_bytes());
    match VerifierHash::new(digest) {
        Ok(hash) => hash,
        Err(_) => unreachable!("sha256 hex digest is always 64 hex chars"),
    }
}

pub fn verifier_hint(last4: &str) -> String {
    format!("{VERIFIER_MASK}{last4}")
}

pub fn generate_tracking_code<R: Rng + ?Sized>(rng: &mut R) -> TrackingCode {
    let code: String = (0..TRACKING_CODE_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..TRACKING_CODE_ALPHABET.len());
            char::from(TRACKING_CODE_ALPHABET[idx])
        })
        .collect();
    match TrackingCode::new(code) {
        Ok(code) => code,
        Err(_) => unreachable!("generated codes only use the tracking alphabet"),
    }
}

pub trait TrackingCodeSource: Send + Sync {
    fn next_code(&self) -> TrackingCode;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomTrackingCodes;

impl TrackingCodeSource for RandomTrackingCodes {
    fn next_code(&self) -> TrackingCode {
        generate_tracking_code(&mut OsRng)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingMintError<E> {
    /// Every attempt hit the unique constraint.
    Exhausted { attempts: usize },
    Store(E),
}

impl<E: fmt::Display> fmt::Display for TrackingMintError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted { attempts } => write!(
                f,
                "could not allocate a unique tracking code after {attempts} attempts"
            ),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MintedCase<T> {
    pub row: T,
    pub attempts: usize,
}

/// Inserts `draft` as given, then with a fresh tracking code per retry. Retries
/// only when `is_collision` recognizes the store error as a unique-constraint
/// violation.
pub fn mint_with_unique_tracking_code<T, E, I, C>(
    draft: &CaseDraft,
    codes: &dyn TrackingCodeSource,
    mut insert: I,
    is_collision: C,
) -> Result<MintedCase<T>, TrackingMintError<E>>
where
    I: FnMut(&CaseDraft) -> Result<T, E>,
    C: Fn(&E) -> bool,
{
    for attempt in 1..=MAX_TRACKING_CODE_ATTEMPTS {
        let retried;
        let candidate = if attempt == 1 {
            draft
        } else {
            retried = draft.with_tracking_code(codes.next_code());
            &retried
        };
        match insert(candidate) {
            Ok(row) => {
                return Ok(MintedCase {
                    row,
                    attempts: attempt,
                })
            }
            Err(err) if is_collision(&err) => {
                tracing::warn!(
                    attempt,
                    max_attempts = MAX_TRACKING_CODE_ATTEMPTS,
                    "tracking code collision, retrying with a new code"
                );
            }
            Err(err) => return Err(TrackingMintError::Store(err)),
        }
    }
    Err(TrackingMintError::Exhausted {
        attempts: MAX_TRACKING_CODE_ATTEMPTS,
    })
}
