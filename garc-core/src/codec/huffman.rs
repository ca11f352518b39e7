//! Prefix-code compression used by script archives.
//!
//! Layout produced by [`encode`]: `u32` LE unpacked length, then an MSB-first
//! bitstream holding the code tree in preorder (`1` = inner node followed by
//! its left and right subtrees, `0` = leaf followed by an 8-bit symbol) and
//! finally the code of every input byte. A single-symbol tree is a bare leaf
//! and spends no bits per byte.

use crate::error::{GarcError, Result};
use crate::read::stream::LimitReader;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io::Read;

const FIRST_NODE: u16 = 0x100;
const MAX_NODES: usize = 0x200;

struct BitReader<R: Read> {
    inner: R,
    cache: u8,
    bits: u8,
}

impl<R: Read> BitReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            cache: 0,
            bits: 0,
        }
    }

    /// `None` once the input is exhausted.
    fn bit(&mut self) -> std::io::Result<Option<bool>> {
        if self.bits == 0 {
            let mut b = [0u8; 1];
            if self.inner.read(&mut b)? == 0 {
                return Ok(None);
            }
            self.cache = b[0];
            self.bits = 8;
        }
        self.bits -= 1;
        Ok(Some((self.cache >> self.bits) & 1 != 0))
    }

    fn bits(&mut self, count: u32) -> std::io::Result<Option<u32>> {
        let mut v = 0u32;
        for _ in 0..count {
            match self.bit()? {
                Some(b) => v = (v << 1) | b as u32,
                None => return Ok(None),
            }
        }
        Ok(Some(v))
    }
}

#[derive(Default)]
struct BitWriter {
    out: Vec<u8>,
    acc: u8,
    used: u8,
}

impl BitWriter {
    fn put(&mut self, bit: bool) {
        self.acc = (self.acc << 1) | bit as u8;
        self.used += 1;
        if self.used == 8 {
            self.out.push(self.acc);
            self.acc = 0;
            self.used = 0;
        }
    }

    fn put_bits(&mut self, value: u32, count: u32) {
        for i in (0..count).rev() {
            self.put((value >> i) & 1 != 0);
        }
    }

    fn finish(mut self) -> Vec<u8> {
        if self.used > 0 {
            self.acc <<= 8 - self.used;
            self.out.push(self.acc);
        }
        self.out
    }
}

/// Streaming decoder; yields symbols until the input runs dry.
///
/// Trailing pad bits can decode to spurious symbols, so callers bound the
/// output with the recorded length (see [`decode`]).
pub struct HuffmanReader<R: Read> {
    bits: BitReader<R>,
    lhs: Vec<u16>,
    rhs: Vec<u16>,
    root: Option<u16>,
    done: bool,
}

impl<R: Read> HuffmanReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            bits: BitReader::new(inner),
            lhs: vec![0; MAX_NODES],
            rhs: vec![0; MAX_NODES],
            root: None,
            done: false,
        }
    }

    fn build_tree(&mut self) -> std::io::Result<u16> {
        let mut token = FIRST_NODE;
        self.node(&mut token)
    }

    fn node(&mut self, token: &mut u16) -> std::io::Result<u16> {
        match self.bits.bit()? {
            Some(true) => {
                let v = *token;
                if v as usize >= MAX_NODES {
                    return Err(GarcError::malformed_data("huffman tree too large").into());
                }
                *token += 1;
                let l = self.node(token)?;
                let r = self.node(token)?;
                self.lhs[v as usize] = l;
                self.rhs[v as usize] = r;
                Ok(v)
            }
            Some(false) => match self.bits.bits(8)? {
                Some(sym) => Ok(sym as u16),
                None => Err(GarcError::malformed_data("huffman tree truncated").into()),
            },
            None => Err(GarcError::malformed_data("huffman tree truncated").into()),
        }
    }

    fn symbol(&mut self, root: u16) -> std::io::Result<Option<u8>> {
        let mut sym = root;
        while sym >= FIRST_NODE {
            sym = match self.bits.bit()? {
                Some(true) => self.rhs[sym as usize],
                Some(false) => self.lhs[sym as usize],
                None => return Ok(None),
            };
        }
        Ok(Some(sym as u8))
    }
}

impl<R: Read> Read for HuffmanReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.done || buf.is_empty() {
            return Ok(0);
        }
        let root = match self.root {
            Some(r) => r,
            None => {
                let r = self.build_tree()?;
                self.root = Some(r);
                r
            }
        };
        // A bare leaf consumes no bits; the caller's limit ends the stream.
        if root < FIRST_NODE {
            buf.fill(root as u8);
            return Ok(buf.len());
        }
        let mut n = 0;
        while n < buf.len() {
            match self.symbol(root)? {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        Ok(n)
    }
}

enum Node {
    Leaf(u8),
    Inner(Box<Node>, Box<Node>),
}

fn build(freq: &[u64; 256]) -> Node {
    let mut heap = BinaryHeap::new();
    let mut nodes: Vec<Option<Node>> = Vec::new();
    for (sym, &f) in freq.iter().enumerate() {
        if f > 0 {
            heap.push(Reverse((f, nodes.len())));
            nodes.push(Some(Node::Leaf(sym as u8)));
        }
    }
    if nodes.is_empty() {
        return Node::Leaf(0);
    }
    while heap.len() > 1 {
        let (Some(Reverse((fa, a))), Some(Reverse((fb, b)))) = (heap.pop(), heap.pop()) else {
            break;
        };
        let (Some(left), Some(right)) = (nodes[a].take(), nodes[b].take()) else {
            break;
        };
        heap.push(Reverse((fa + fb, nodes.len())));
        nodes.push(Some(Node::Inner(Box::new(left), Box::new(right))));
    }
    match heap.pop() {
        Some(Reverse((_, root))) => nodes[root].take().unwrap_or(Node::Leaf(0)),
        None => Node::Leaf(0),
    }
}

fn write_tree(node: &Node, w: &mut BitWriter, path: &mut Vec<bool>, codes: &mut [Vec<bool>]) {
    match node {
        Node::Leaf(sym) => {
            w.put(false);
            w.put_bits(*sym as u32, 8);
            codes[*sym as usize] = path.clone();
        }
        Node::Inner(l, r) => {
            w.put(true);
            path.push(false);
            write_tree(l, w, path, codes);
            path.pop();
            path.push(true);
            write_tree(r, w, path, codes);
            path.pop();
        }
    }
}

/// Compress `data`, prefixing the unpacked length.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut freq = [0u64; 256];
    for &b in data {
        freq[b as usize] += 1;
    }
    let tree = build(&freq);
    let mut codes = vec![Vec::new(); 256];
    let mut w = BitWriter::default();
    write_tree(&tree, &mut w, &mut Vec::new(), &mut codes);
    for &b in data {
        for &bit in &codes[b as usize] {
            w.put(bit);
        }
    }
    let mut out = (data.len() as u32).to_le_bytes().to_vec();
    out.extend(w.finish());
    out
}

/// Inverse of [`encode`].
pub fn decode(packed: &[u8]) -> Result<Vec<u8>> {
    let len = crate::util::bytes::u32_le(packed, 0)? as usize;
    let mut out = Vec::with_capacity(len.min(packed.len().saturating_mul(8)));
    if len > 0 {
        LimitReader::new(HuffmanReader::new(&packed[4..]), len as u64).read_to_end(&mut out)?;
    }
    if out.len() != len {
        return Err(GarcError::malformed_data(format!(
            "huffman stream ended after {} of {} bytes",
            out.len(),
            len
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[quickcheck]
    fn test_round_trip(data: Vec<u8>) -> bool {
        decode(&encode(&data)).map(|d| d == data).unwrap_or(false)
    }

    #[test]
    fn empty_and_repetitive_inputs() {
        assert_eq!(decode(&encode(&[])).unwrap(), Vec::<u8>::new());
        let same = vec![0x41u8; 1000];
        let packed = encode(&same);
        // bare leaf: length + 9 tree bits
        assert_eq!(packed.len(), 4 + 2);
        assert_eq!(decode(&packed).unwrap(), same);
    }

    #[test]
    fn truncated_stream_is_malformed() {
        let mut packed = encode(b"the quick brown fox jumps over the lazy dog");
        packed.truncate(packed.len() - 8);
        assert!(matches!(decode(&packed), Err(GarcError::MalformedData(_))));
    }

    #[test]
    fn reader_is_lazy_per_chunk() {
        let text = b"aaaaabbbcc d".repeat(50);
        let packed = encode(&text);
        let mut r = LimitReader::new(HuffmanReader::new(&packed[4..]), text.len() as u64);
        let mut first = [0u8; 7];
        r.read_exact(&mut first).unwrap();
        assert_eq!(&first, b"aaaaabb");
        let mut rest = Vec::new();
        r.read_to_end(&mut rest).unwrap();
        assert_eq!(rest.len(), text.len() - 7);
    }
}
