//! Persisted key material.
//!
//! The receiver reads three kinds of files from its `exec_path` and writes
//! back the ones it verifies on air:
//!
//! * The stored DSM-KROOT, a text file with two lines: the hex encoded
//!   DSM-KROOT and the hex encoded NMA header it was transmitted with.
//! * Public keys, as small XML documents with `<PKID>`, `<PKType>` and
//!   `<point>` elements.
//! * The Merkle tree, as an XML document with one `<TreeNode>` element per
//!   node, each holding `<j>`, `<i>` and `<x_ji>`. Only the root (`j = 4`,
//!   `i = 0`) is used.
//!
//! The XML readers only look for the elements named above and ignore
//! everything else in the document, which must be well-formed.

use crate::bitfields::{DsmKroot, NmaHeader};
use crate::pubkey::{PublicKey, PublicKeyError, PublicKeyType};
use crate::types::MerkleTreeNode;
use crate::validation::Validated;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the file where the last verified DSM-KROOT is written.
pub const LAST_KROOT_NAME: &str = "OSNMA_last_KROOT.txt";

const MERKLE_ROOT_LEVEL: u8 = 4;

/// Errors produced when reading or writing key material.
#[derive(Debug, thiserror::Error)]
pub enum KeyMaterialError {
    /// I/O error.
    #[error("{}: {source}", path.display())]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// A required element is missing from the file.
    #[error("missing {0}")]
    Missing(&'static str),
    /// A hex field cannot be decoded.
    #[error("invalid hex in {field}: {source}")]
    Hex {
        /// Field name.
        field: &'static str,
        /// Underlying error.
        source: hex::FromHexError,
    },
    /// A numeric field cannot be parsed.
    #[error("invalid value {value:?} for {field}")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// Value as found in the file.
        value: String,
    },
    /// The document is not well-formed XML.
    #[error("invalid XML: {0}")]
    Xml(roxmltree::Error),
    /// The public key point is not valid for its type.
    #[error("invalid public key: {0}")]
    PublicKey(#[from] PublicKeyError),
}

fn read(path: &Path) -> Result<String, KeyMaterialError> {
    fs::read_to_string(path).map_err(|source| KeyMaterialError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write(path: &Path, contents: &str) -> Result<(), KeyMaterialError> {
    fs::write(path, contents).map_err(|source| KeyMaterialError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn decode_hex(field: &'static str, value: &str) -> Result<Vec<u8>, KeyMaterialError> {
    hex::decode(value.trim()).map_err(|source| KeyMaterialError::Hex { field, source })
}

fn parse_xml(text: &str) -> Result<roxmltree::Document<'_>, KeyMaterialError> {
    roxmltree::Document::parse(text).map_err(KeyMaterialError::Xml)
}

// Trimmed text of the first element named `tag` below `node`
fn element<'a>(
    node: roxmltree::Node<'a, '_>,
    tag: &'static str,
) -> Result<&'a str, KeyMaterialError> {
    node.descendants()
        .find(|n| n.has_tag_name(tag))
        .and_then(|n| n.text())
        .map(str::trim)
        .ok_or(KeyMaterialError::Missing(tag))
}

fn parse_u8(field: &'static str, value: &str) -> Result<u8, KeyMaterialError> {
    value
        .trim()
        .parse()
        .map_err(|_| KeyMaterialError::InvalidValue {
            field,
            value: value.to_string(),
        })
}

/// DSM-KROOT stored on disk together with its NMA header.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct StoredKroot {
    /// DSM-KROOT bytes.
    pub dsm_kroot: Vec<u8>,
    /// NMA header transmitted with the DSM-KROOT.
    pub nma_header: NmaHeader,
}

impl StoredKroot {
    /// Parses the contents of a stored DSM-KROOT file.
    pub fn parse(text: &str) -> Result<StoredKroot, KeyMaterialError> {
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
        let dsm_kroot = decode_hex(
            "DSM-KROOT",
            lines.next().ok_or(KeyMaterialError::Missing("DSM-KROOT"))?,
        )?;
        let header = decode_hex(
            "NMA header",
            lines.next().ok_or(KeyMaterialError::Missing("NMA header"))?,
        )?;
        let [nma_header] = header[..] else {
            return Err(KeyMaterialError::InvalidValue {
                field: "NMA header",
                value: hex::encode(&header),
            });
        };
        if !DsmKroot(&dsm_kroot).is_complete() {
            return Err(KeyMaterialError::InvalidValue {
                field: "DSM-KROOT",
                value: hex::encode(&dsm_kroot),
            });
        }
        Ok(StoredKroot {
            dsm_kroot,
            nma_header: NmaHeader(nma_header),
        })
    }

    /// Reads a stored DSM-KROOT file.
    pub fn read(path: &Path) -> Result<StoredKroot, KeyMaterialError> {
        StoredKroot::parse(&read(path)?)
    }

    /// Serializes the DSM-KROOT in the stored file format.
    pub fn to_text(&self) -> String {
        format!(
            "{}\n{}\n",
            hex::encode(&self.dsm_kroot),
            hex::encode([self.nma_header.0])
        )
    }

    /// Writes the DSM-KROOT as [`LAST_KROOT_NAME`] in `dir`.
    pub fn write(&self, dir: &Path) -> Result<PathBuf, KeyMaterialError> {
        let path = dir.join(LAST_KROOT_NAME);
        write(&path, &self.to_text())?;
        log::info!("stored DSM-KROOT in {}", path.display());
        Ok(path)
    }
}

/// Parses a public key XML document.
///
/// Keys read from disk are trusted and returned as validated.
pub fn parse_public_key(text: &str) -> Result<PublicKey<Validated>, KeyMaterialError> {
    let doc = parse_xml(text)?;
    let root = doc.root();
    let pkid = parse_u8("PKID", element(root, "PKID")?)?;
    let type_text = element(root, "PKType")?;
    let key_type =
        PublicKeyType::from_name(type_text).ok_or_else(|| KeyMaterialError::InvalidValue {
            field: "PKType",
            value: type_text.to_string(),
        })?;
    let point = decode_hex("point", element(root, "point")?)?;
    Ok(PublicKey::from_sec1(key_type, &point, pkid)?.force_valid())
}

/// Reads a public key file.
pub fn read_public_key(path: &Path) -> Result<PublicKey<Validated>, KeyMaterialError> {
    parse_public_key(&read(path)?)
}

/// File name used for a public key.
pub fn public_key_file_name(pkid: u8) -> String {
    format!("OSNMA_PublicKey_{pkid}.xml")
}

/// Serializes a public key as an XML document.
pub fn public_key_to_xml(pubkey: &PublicKey<Validated>) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <signalData>\n  <body>\n    <MerkleTree>\n      <PublicKey>\n\
         \x20       <PKID>{}</PKID>\n\
         \x20       <PKType>{}</PKType>\n\
         \x20       <point>{}</point>\n\
         \x20     </PublicKey>\n    </MerkleTree>\n  </body>\n</signalData>\n",
        pubkey.pkid(),
        pubkey.key_type().name(),
        hex::encode_upper(pubkey.point())
    )
}

/// Writes a public key in `dir`, named after its PKID.
pub fn write_public_key(
    dir: &Path,
    pubkey: &PublicKey<Validated>,
) -> Result<PathBuf, KeyMaterialError> {
    let path = dir.join(public_key_file_name(pubkey.pkid()));
    write(&path, &public_key_to_xml(pubkey))?;
    log::info!("stored public key {} in {}", pubkey.pkid(), path.display());
    Ok(path)
}

/// Parses a Merkle tree XML document and returns its root.
pub fn parse_merkle_root(text: &str) -> Result<MerkleTreeNode, KeyMaterialError> {
    let doc = parse_xml(text)?;
    for node in doc.descendants().filter(|n| n.has_tag_name("TreeNode")) {
        let j = parse_u8("j", element(node, "j")?)?;
        let i = parse_u8("i", element(node, "i")?)?;
        if j != MERKLE_ROOT_LEVEL || i != 0 {
            continue;
        }
        let value = decode_hex("x_ji", element(node, "x_ji")?)?;
        return MerkleTreeNode::try_from(&value[..]).map_err(|_| {
            KeyMaterialError::InvalidValue {
                field: "x_ji",
                value: hex::encode(&value),
            }
        });
    }
    Err(KeyMaterialError::Missing("Merkle tree root"))
}

/// Reads the root of a Merkle tree file.
pub fn read_merkle_root(path: &Path) -> Result<MerkleTreeNode, KeyMaterialError> {
    parse_merkle_root(&read(path)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bitfields::test::signed_kroot;
    use hex_literal::hex;

    // P-256 generator point, compressed
    const POINT: [u8; 33] =
        hex!("036B17D1F2E12C4247F8BCE6E563A440F277037D812DEB33A0F4A13945D898C296");

    #[test]
    fn kroot_file() {
        let stored = StoredKroot {
            dsm_kroot: signed_kroot(NmaHeader(0x52), 1, &[0x5a; 12]),
            nma_header: NmaHeader(0x52),
        };
        let text = stored.to_text();
        assert!(text.ends_with("\n52\n"));
        let dir = tempfile::tempdir().unwrap();
        let path = stored.write(dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), LAST_KROOT_NAME);
        assert_eq!(StoredKroot::read(&path).unwrap(), stored);

        let kroot_line = hex::encode(&stored.dsm_kroot);
        assert!(matches!(
            StoredKroot::parse(&format!("{kroot_line}\n")),
            Err(KeyMaterialError::Missing("NMA header"))
        ));
        assert!(matches!(
            StoredKroot::parse(&format!("{kroot_line}\n5252\n")),
            Err(KeyMaterialError::InvalidValue { field: "NMA header", .. })
        ));
        assert!(matches!(
            StoredKroot::parse("zz\n52\n"),
            Err(KeyMaterialError::Hex { .. })
        ));
    }

    #[test]
    fn truncated_kroot_file() {
        // NB_DK = 1 announces 7 blocks
        assert!(matches!(
            StoredKroot::parse("13\n52\n"),
            Err(KeyMaterialError::InvalidValue { field: "DSM-KROOT", .. })
        ));
        assert!(matches!(
            StoredKroot::parse("52\n"),
            Err(KeyMaterialError::Missing("NMA header"))
        ));
        let kroot = signed_kroot(NmaHeader(0x52), 1, &[0x5a; 12]);
        let short = format!("{}\n52\n", hex::encode(&kroot[..kroot.len() - 1]));
        assert!(matches!(
            StoredKroot::parse(&short),
            Err(KeyMaterialError::InvalidValue { field: "DSM-KROOT", .. })
        ));
    }

    #[test]
    fn public_key_file() {
        let text = format!(
            "<signalData><body><MerkleTree><PublicKey>\
             <PKID> 1 </PKID><PKType>ECDSA P-256/SHA-256</PKType>\
             <point>{}</point></PublicKey></MerkleTree></body></signalData>",
            hex::encode(POINT)
        );
        let pubkey = parse_public_key(&text).unwrap();
        assert_eq!(pubkey.pkid(), 1);
        assert_eq!(pubkey.key_type(), PublicKeyType::P256Sha256);

        let dir = tempfile::tempdir().unwrap();
        let path = write_public_key(dir.path(), &pubkey).unwrap();
        assert_eq!(path.file_name().unwrap(), "OSNMA_PublicKey_1.xml");
        assert_eq!(read_public_key(&path).unwrap(), pubkey);

        let missing = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_public_key(&missing.path().join("OSNMA_PublicKey_2.xml")),
            Err(KeyMaterialError::Io { .. })
        ));
        assert!(matches!(
            parse_public_key("<PublicKey><PKID>1</PKID><PKType>RSA</PKType><point>00</point></PublicKey>"),
            Err(KeyMaterialError::InvalidValue { field: "PKType", .. })
        ));
        assert!(matches!(
            parse_public_key(
                "<PublicKey><PKID>1</PKID><PKType>ECDSA P-256/SHA-256</PKType>\
                 <point>0200</point></PublicKey>"
            ),
            Err(KeyMaterialError::PublicKey(_))
        ));
    }

    #[test]
    fn xml_escapes_and_errors() {
        let text = format!(
            "<?xml version=\"1.0\"?>\n<!-- exported --><PublicKey version=\"2\">\
             <PKID><![CDATA[4]]></PKID><PKType>ECDSA P-256/SHA-256</PKType>\
             <point>{}</point></PublicKey>",
            hex::encode(POINT)
        );
        assert_eq!(parse_public_key(&text).unwrap().pkid(), 4);
        assert!(matches!(
            parse_public_key("<PublicKey><PKID>1</PKID>"),
            Err(KeyMaterialError::Xml(_))
        ));
        assert!(matches!(
            parse_public_key("<PublicKey><PKID>1</PKID></PublicKey>"),
            Err(KeyMaterialError::Missing("PKType"))
        ));
    }

    #[test]
    fn merkle_file() {
        let root = [0x5a; 32];
        let leaf = [0x11; 32];
        let text = format!(
            "<MerkleTree><N>16</N>\
             <TreeNode><j>0</j><i>3</i><lengthInBits>256</lengthInBits><x_ji>{}</x_ji></TreeNode>\
             <TreeNode><j>4</j><i>0</i><lengthInBits>256</lengthInBits><x_ji>{}</x_ji></TreeNode>\
             </MerkleTree>",
            hex::encode(leaf),
            hex::encode(root)
        );
        let dir = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(dir.path(), &text).unwrap();
        assert_eq!(read_merkle_root(dir.path()).unwrap(), root);

        assert!(matches!(
            parse_merkle_root("<TreeNode><j>3</j><i>0</i><x_ji>00</x_ji></TreeNode>"),
            Err(KeyMaterialError::Missing("Merkle tree root"))
        ));
        assert!(matches!(
            parse_merkle_root("<TreeNode><j>4</j><i>0</i><x_ji>0011</x_ji></TreeNode>"),
            Err(KeyMaterialError::InvalidValue { field: "x_ji", .. })
        ));
    }
}
