//! Index-field keys for headerless Valkyria archives.

/// Offset of the key material inside `system.dat`.
pub const SYSTEM_INFO_OFFSET: u64 = 0x10E;
pub const SYSTEM_INFO_LEN: usize = 260;

/// Sum the bytes of a NUL-terminated field, walking back from the
/// terminator, into four rotating lanes.
///
/// `None` when the field has no terminator.
fn fold(field: &[u8]) -> Option<[u8; 4]> {
    let len = field.iter().position(|&b| b == 0)?;
    let mut key = [0u8; 4];
    let mut j = 0;
    for i in (1..=len).rev() {
        key[j] = key[j].wrapping_add(field[i]);
        j = (j + 1) % 4;
    }
    Some(key)
}

/// Archive key derived from the `system.dat` info block.
pub fn arc_key(info: &[u8]) -> Option<[u8; 4]> {
    fold(info)
}

/// XOR key for the offset and size fields following a name field.
pub fn entry_key(arc_key: &[u8; 4], name_field: &[u8]) -> Option<u32> {
    let mut key = fold(name_field)?;
    for (k, a) in key.iter_mut().zip(arc_key.iter().rev()) {
        *k = k.wrapping_add(*a);
    }
    Some(u32::from_le_bytes(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_walks_back_from_terminator() {
        // len 5: i = 5 (NUL), 4, 3, 2, 1 -> lanes 0, 1, 2, 3, 0
        let field = b"abcde\0";
        assert_eq!(fold(field), Some([b'b', b'e', b'd', b'c']));
        assert_eq!(fold(b"abc"), None);
        assert_eq!(fold(b"\0abc"), Some([0; 4]));
    }

    #[test]
    fn entry_key_adds_reversed_arc_key() {
        let arc = [1, 2, 3, 4];
        let mut name = [0u8; 0x104];
        name[..5].copy_from_slice(b"abcde");
        let key = entry_key(&arc, &name).unwrap();
        assert_eq!(key.to_le_bytes(), [b'b' + 4, b'e' + 3, b'd' + 2, b'c' + 1]);
    }
}
