use sha2::{
    digest::{generic_array::GenericArray, OutputSizeUser},
    Sha256,
};
use snafu::prelude::*;

use crate::ErrorKind;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("checksum {digest:?} is not valid hex"))]
    HexDecode { digest: String, source: hex::FromHexError },
    #[snafu(display("checksum {digest:?} is not a sha256 digest"))]
    DigestFromExactIter { digest: String },
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Parse
    }
}

pub type Sha256Digest = GenericArray<u8, <Sha256 as OutputSizeUser>::OutputSize>;

#[cfg_attr(feature = "tracing", tracing::instrument)]
pub fn parse_sha256_digest(digest: &str) -> Result<Sha256Digest, self::Error> {
    let digest = digest.trim();
    let bytes = hex::decode(digest).context(HexDecodeSnafu { digest })?;
    GenericArray::from_exact_iter(bytes).context(DigestFromExactIterSnafu { digest })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_digest() {
        let text = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
        let digest = parse_sha256_digest(text).unwrap();
        assert_eq!(hex::encode(digest), text);
        assert!(parse_sha256_digest(&text.to_uppercase()).is_ok());
    }

    #[test]
    fn rejects_wrong_length_and_bad_hex() {
        assert!(matches!(parse_sha256_digest("abcd"), Err(Error::DigestFromExactIter { .. })));
        assert!(matches!(parse_sha256_digest("zz"), Err(Error::HexDecode { .. })));
    }
}
