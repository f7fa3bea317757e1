//! Body cipher seam.
//!
//! The channel protocol encrypts each packet group body with a rolling key
//! and verifies it with three 16-bit checks. The production algorithm lives
//! outside this crate; anything implementing [`Cipher`] can be plugged into
//! [`CryptReader`](crate::CryptReader) and [`CryptWriter`](crate::CryptWriter).

/// The checks a cipher computes over a packet body.
///
/// `check0..check2` travel in the packet's own header. `combined` travels in
/// the *next* packet's header as `prev_packet_combined_check`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Checks {
    pub combined: u16,
    pub check0: u16,
    pub check1: u16,
    pub check2: u16,
}

impl Checks {
    /// The three checks that are compared against a header.
    pub fn header_checks(&self) -> [u16; 3] {
        [self.check0, self.check1, self.check2]
    }
}

/// Encrypts and decrypts packet group bodies.
///
/// # Trait bounds
///
/// `Send + Sync + 'static` because one cipher is shared (behind an `Arc`)
/// by every connection the listener accepts.
pub trait Cipher: Send + Sync + 'static {
    /// Encrypts `plain` with the current key. Returns the cipher text and
    /// the checks computed over it.
    fn encrypt(&self, plain: &[u8], key: u32) -> (Vec<u8>, Checks);

    /// Decrypts `cipher_text` with the current key. Returns the plain text
    /// and the checks the sender should have put in the header.
    fn decrypt(&self, cipher_text: &[u8], key: u32) -> (Vec<u8>, Checks);
}

/// A pass-through cipher with simple additive checks.
///
/// Both directions must agree on the cipher, so this is only useful for
/// local tooling and tests where client and server are under our control.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCipher;

impl Cipher for NullCipher {
    fn encrypt(&self, plain: &[u8], _key: u32) -> (Vec<u8>, Checks) {
        (plain.to_vec(), null_checks(plain))
    }

    fn decrypt(&self, cipher_text: &[u8], _key: u32) -> (Vec<u8>, Checks) {
        (cipher_text.to_vec(), null_checks(cipher_text))
    }
}

fn null_checks(data: &[u8]) -> Checks {
    let mut check0 = 0u16;
    let mut check1 = 0u16;
    for (i, &b) in data.iter().enumerate() {
        check0 = check0.wrapping_add(u16::from(b));
        // Alternate bytes into the high and low halves.
        check1 ^= if i % 2 == 0 {
            u16::from(b) << 8
        } else {
            u16::from(b)
        };
    }
    let check2 = data.len() as u16;
    Checks {
        combined: check0.wrapping_add(check1).wrapping_add(check2),
        check0,
        check1,
        check2,
    }
}
