use flatgeobuf::Header;

use crate::io::flatgeobuf::MAGIC_BYTES;

fn size_prefixed(bytes: &[u8], offset: usize) -> &[u8] {
    let len = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
    &bytes[offset..offset + 4 + len]
}

pub(crate) fn decode_header(bytes: &[u8]) -> Header<'_> {
    assert_eq!(bytes[..MAGIC_BYTES.len()], MAGIC_BYTES);
    flatgeobuf::size_prefixed_root_as_header(size_prefixed(bytes, MAGIC_BYTES.len())).unwrap()
}

/// Size-prefixed feature buffers following the header.
pub(crate) fn decode_features(bytes: &[u8]) -> Vec<&[u8]> {
    let mut offset = MAGIC_BYTES.len();
    offset += size_prefixed(bytes, offset).len();
    let mut features = vec![];
    while offset < bytes.len() {
        let feature = size_prefixed(bytes, offset);
        flatgeobuf::size_prefixed_root_as_feature(feature).unwrap();
        offset += feature.len();
        features.push(feature);
    }
    features
}

