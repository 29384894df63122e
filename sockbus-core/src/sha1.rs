//! SHA-1 digest (FIPS 180-1), implemented from scratch
//!
//! The cookie mechanism's proof-of-possession is a SHA-1 hex digest, so
//! the handshake carries its own implementation rather than pulling in a
//! hash crate for one fixed algorithm.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Digest length in bytes
pub const DIGEST_LEN: usize = 20;

const BLOCK_LEN: usize = 64;

/// Incremental SHA-1 context. The pending block may hold keyring
/// secrets, so the whole context scrubs itself on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Sha1 {
    state: [u32; 5],
    block: [u8; BLOCK_LEN],
    block_len: usize,
    message_len: u64,
}

impl Sha1 {
    /// Fresh context with the FIPS 180-1 initial state
    pub fn new() -> Self {
        Sha1 {
            state: [0x67452301, 0xefcdab89, 0x98badcfe, 0x10325476, 0xc3d2e1f0],
            block: [0u8; BLOCK_LEN],
            block_len: 0,
            message_len: 0,
        }
    }

    /// Feed message bytes
    pub fn update(&mut self, data: &[u8]) {
        self.message_len = self.message_len.wrapping_add(data.len() as u64);
        let mut input = data;

        if self.block_len > 0 {
            let take = (BLOCK_LEN - self.block_len).min(input.len());
            self.block[self.block_len..self.block_len + take].copy_from_slice(&input[..take]);
            self.block_len += take;
            input = &input[take..];
            if self.block_len == BLOCK_LEN {
                Self::compress(&mut self.state, &self.block);
                self.block_len = 0;
            }
        }

        // Full blocks are staged through the owned buffer so no copy of
        // potentially secret input lands outside the scrubbed context
        let mut chunks = input.chunks_exact(BLOCK_LEN);
        for chunk in &mut chunks {
            self.block.copy_from_slice(chunk);
            Self::compress(&mut self.state, &self.block);
        }

        let rest = chunks.remainder();
        if !rest.is_empty() {
            self.block[..rest.len()].copy_from_slice(rest);
            self.block_len = rest.len();
        }
    }

    /// Pad, run the final blocks and return the 20-byte digest
    pub fn finish(mut self) -> [u8; DIGEST_LEN] {
        let bit_len = self.message_len.wrapping_mul(8);

        // One 0x80 byte, zeros to 56 mod 64, then the big-endian bit count.
        let used = (self.message_len as usize + 1) % BLOCK_LEN;
        let zeros = if used <= 56 { 56 - used } else { BLOCK_LEN + 56 - used };
        let mut padding = vec![0u8; 1 + zeros + 8];
        padding[0] = 0x80;
        padding[1 + zeros..].copy_from_slice(&bit_len.to_be_bytes());
        self.update(&padding);
        debug_assert_eq!(self.block_len, 0);

        let mut digest = [0u8; DIGEST_LEN];
        for (i, word) in self.state.iter().enumerate() {
            digest[i * 4..i * 4 + 4].copy_from_slice(&word.to_be_bytes());
        }
        digest
    }

    /// One-shot digest
    pub fn digest(data: &[u8]) -> [u8; DIGEST_LEN] {
        let mut ctx = Sha1::new();
        ctx.update(data);
        ctx.finish()
    }

    /// One-shot digest as lowercase hex
    pub fn digest_hex(data: &[u8]) -> String {
        hex::encode(Self::digest(data))
    }

    fn compress(state: &mut [u32; 5], block: &[u8; BLOCK_LEN]) {
        let mut w = [0u32; 80];
        for i in 0..16 {
            w[i] = u32::from_be_bytes([
                block[4 * i],
                block[4 * i + 1],
                block[4 * i + 2],
                block[4 * i + 3],
            ]);
        }
        for i in 16..80 {
            w[i] = (w[i - 3] ^ w[i - 8] ^ w[i - 14] ^ w[i - 16]).rotate_left(1);
        }

        let [mut a, mut b, mut c, mut d, mut e] = *state;

        for (i, &word) in w.iter().enumerate() {
            let (f, k) = match i {
                0..=19 => ((b & c) | (!b & d), 0x5a827999u32),
                20..=39 => (b ^ c ^ d, 0x6ed9eba1),
                40..=59 => ((b & c) | (b & d) | (c & d), 0x8f1bbcdc),
                _ => (b ^ c ^ d, 0xca62c1d6),
            };
            let temp = a
                .rotate_left(5)
                .wrapping_add(f)
                .wrapping_add(e)
                .wrapping_add(k)
                .wrapping_add(word);
            e = d;
            d = c;
            c = b.rotate_left(30);
            b = a;
            a = temp;
        }

        state[0] = state[0].wrapping_add(a);
        state[1] = state[1].wrapping_add(b);
        state[2] = state[2].wrapping_add(c);
        state[3] = state[3].wrapping_add(d);
        state[4] = state[4].wrapping_add(e);
    }
}

impl Default for Sha1 {
    fn default() -> Self {
        Self::new()
    }
}
