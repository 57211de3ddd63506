//! Record keys
//!
//! Keys are timestamp identifiers: a 64-bit integer with the top bit clear,
//! holding 53 bits of microseconds since the Unix epoch followed by a 10-bit
//! clock identifier. They are rendered as 13 characters of sortable base-32,
//! so comparing two keys as strings gives the same answer as comparing their
//! creation times.
//!
//! ```text
//! 0 | tttttttttttttttttttttttttttttttttttttttttttttttttttt | cccccccccc
//!   |            53 bits of microseconds                  | clock id
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Sortable base-32 alphabet (ascending byte order)
const ALPHABET: &[u8; 32] = b"234567abcdefghijklmnopqrstuvwxyz";

/// Encoded key length in characters
pub const KEY_LEN: usize = 13;

const CLOCK_ID_BITS: u32 = 10;
const CLOCK_ID_MASK: u64 = (1 << CLOCK_ID_BITS) - 1;
const TIMESTAMP_MASK: u64 = (1 << 53) - 1;
/// Largest encodable key: every bit below the sign bit set
const MAX_KEY: u64 = (TIMESTAMP_MASK << CLOCK_ID_BITS) | CLOCK_ID_MASK;

/// A record key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(u64);

impl Key {
    /// Build a key from a microsecond timestamp and a clock identifier
    ///
    /// Timestamps beyond the 53-bit range saturate at the largest one.
    pub fn from_parts(timestamp_micros: u64, clock_id: u16) -> Self {
        let ts = timestamp_micros.min(TIMESTAMP_MASK);
        Self((ts << CLOCK_ID_BITS) | (u64::from(clock_id) & CLOCK_ID_MASK))
    }

    /// Parse an encoded key, rejecting anything the generator could not have produced
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != KEY_LEN {
            return None;
        }
        let mut value: u64 = 0;
        for (i, byte) in s.bytes().enumerate() {
            let digit = ALPHABET.iter().position(|&c| c == byte)? as u64;
            // 13 digits carry 65 bits; the leading digit may only use the low 3
            if i == 0 && digit >= 8 {
                return None;
            }
            value = (value << 5) | digit;
        }
        Some(Self(value))
    }

    /// Microseconds since the Unix epoch
    pub fn timestamp_micros(&self) -> u64 {
        self.0 >> CLOCK_ID_BITS
    }

    pub fn clock_id(&self) -> u16 {
        (self.0 & CLOCK_ID_MASK) as u16
    }

    /// Creation time embedded in the key
    pub fn timestamp(&self) -> DateTime<Utc> {
        let micros = i64::try_from(self.timestamp_micros()).unwrap_or(i64::MAX);
        Utc.timestamp_micros(micros)
            .single()
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    fn encode(&self) -> String {
        let mut out = [0u8; KEY_LEN];
        let mut value = self.0;
        for slot in out.iter_mut().rev() {
            *slot = ALPHABET[(value & 0x1f) as usize];
            value >>= 5;
        }
        out.iter().map(|&b| b as char).collect()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Error returned when a string is not a well-formed key
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed record key {0:?}")]
pub struct ParseKeyError(pub String);

/// Every key above the last one handed out has been used
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("record key space exhausted after {last}")]
pub struct KeySpaceExhausted {
    pub last: Key,
}

impl FromStr for Key {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Key::parse(s).ok_or_else(|| ParseKeyError(s.to_string()))
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Source of wall-clock time for key generation
pub trait Clock: Send + Sync {
    /// Current time in microseconds since the Unix epoch
    fn now_micros(&self) -> u64;
}

/// Clock backed by the system time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_micros(&self) -> u64 {
        u64::try_from(Utc::now().timestamp_micros()).unwrap_or(0)
    }
}

/// Produces strictly increasing keys
///
/// The last emitted key is held under a lock, so concurrent callers never
/// receive the same key. When the clock stands still or steps backwards the
/// generator clamps forward to one microsecond past the last emitted value.
/// Clock readings past the 53-bit range are saturated, never wrapped; once the
/// timestamp is pinned at its maximum the generator keeps counting through
/// the low bits of the key until none are left.
pub struct KeyGenerator {
    clock: Box<dyn Clock>,
    clock_id: u16,
    last: Mutex<Option<Key>>,
}

impl KeyGenerator {
    /// Generator driven by the system clock
    pub fn new(clock_id: u16) -> Self {
        Self::with_clock(clock_id, SystemClock)
    }

    pub fn with_clock(clock_id: u16, clock: impl Clock + 'static) -> Self {
        Self {
            clock: Box::new(clock),
            clock_id: clock_id & CLOCK_ID_MASK as u16,
            last: Mutex::new(None),
        }
    }

    pub fn clock_id(&self) -> u16 {
        self.clock_id
    }

    /// Allocate the next key
    pub fn next(&self) -> Result<Key, KeySpaceExhausted> {
        let now = self.clock.now_micros();
        if now > TIMESTAMP_MASK {
            tracing::warn!(now, "clock reading beyond the key range, saturating");
        }
        let candidate = Key::from_parts(now, self.clock_id);

        let mut last = self.last.lock();
        let key = match *last {
            Some(prev) if candidate <= prev => {
                tracing::trace!(now, last = %prev, "clock did not advance, clamping key forward");
                clamp_forward(prev, self.clock_id)?
            }
            _ => candidate,
        };
        *last = Some(key);
        Ok(key)
    }
}

/// Smallest key after `prev`, keeping `clock_id` while the timestamp has room
fn clamp_forward(prev: Key, clock_id: u16) -> Result<Key, KeySpaceExhausted> {
    let ts = prev.timestamp_micros();
    if ts < TIMESTAMP_MASK {
        return Ok(Key::from_parts(ts + 1, clock_id));
    }
    if prev.0 >= MAX_KEY {
        return Err(KeySpaceExhausted { last: prev });
    }
    Ok(Key(prev.0 + 1))
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new(0)
    }
}

impl fmt::Debug for KeyGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyGenerator")
            .field("clock_id", &self.clock_id)
            .field("last", &*self.last.lock())
            .finish()
    }
}
