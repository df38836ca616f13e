use osnma_receiver::key_material::{self, KeyMaterialError};
use osnma_receiver::status::StartStage;
use osnma_receiver::{
    Config, ConfigError, Gst, InavBand, NavigationPage, Osnma, OsnmaError, PageOutcome, Svn,
};
use std::path::Path;

const PUBKEY_XML: &str = "<signalData><body><MerkleTree><PublicKey>\
    <PKID>7</PKID><PKType>ECDSA P-256/SHA-256</PKType>\
    <point>036B17D1F2E12C4247F8BCE6E563A440F277037D812DEB33A0F4A13945D898C296</point>\
    </PublicKey></MerkleTree></body></signalData>";

const MERKLE_XML: &str = "<signalData><body><MerkleTree>\
    <TreeNode><j>4</j><i>0</i><lengthInBits>256</lengthInBits>\
    <x_ji>832E15EDE55655EAC6E399A539477B7C034CCE24C3C93FFC904ACD9BF842F04E</x_ji></TreeNode>\
    <TreeNode><j>3</j><i>0</i>\
    <x_ji>DEE8D9CE8C8C5DE3E1A3CBD8A5BD6AC7A9E7A5E1D5A1BF7E0D1D5C2C9F3E6B10</x_ji></TreeNode>\
    </MerkleTree></body></signalData>";

fn config(dir: &Path, extra: &[(&str, &str)]) -> Result<Config, ConfigError> {
    let exec_path = dir.to_str().unwrap();
    let pairs = [("exec_path", exec_path)].into_iter().chain(extra.iter().copied());
    Config::from_pairs(pairs)
}

fn silent_page(gst: Gst) -> NavigationPage {
    let mut nav_bits = [0u8; 30];
    // odd page half flag
    nav_bits[15] = 0x80;
    NavigationPage {
        svn: Svn::try_from(11).unwrap(),
        gst,
        nav_bits,
        band: InavBand::E1B,
        crc_ok: true,
    }
}

#[test]
fn cold_start_without_key_material() {
    let dir = tempfile::tempdir().unwrap();
    let osnma = Osnma::new(config(dir.path(), &[]).unwrap()).unwrap();
    assert_eq!(osnma.stage(), StartStage::ColdStart);
    assert!(osnma.pubkeys().is_empty());
    assert!(osnma.chain().is_none());
}

#[test]
fn warm_start_from_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("OSNMA_MerkleTree.xml"), MERKLE_XML).unwrap();
    std::fs::write(dir.path().join("OSNMA_PublicKey_7.xml"), PUBKEY_XML).unwrap();
    let config = config(dir.path(), &[("pubk_name", "OSNMA_PublicKey_7.xml")]).unwrap();
    let osnma = Osnma::new(config).unwrap();
    assert_eq!(osnma.stage(), StartStage::WarmStart);
    assert_eq!(osnma.pubkeys().len(), 1);
    assert_eq!(osnma.pubkeys()[0].pkid(), 7);

    // The key survives a write and read cycle through the key directory
    let out = tempfile::tempdir().unwrap();
    let path = key_material::write_public_key(out.path(), &osnma.pubkeys()[0]).unwrap();
    assert!(path.ends_with("OSNMA_PublicKey_7.xml"));
    let reread = key_material::read_public_key(&path).unwrap();
    assert_eq!(reread.point(), osnma.pubkeys()[0].point());
}

#[test]
fn missing_public_key_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), &[("pubk_name", "OSNMA_PublicKey_1.xml")]).unwrap();
    assert!(matches!(
        Osnma::new(config),
        Err(OsnmaError::KeyMaterial(KeyMaterialError::Io { .. }))
    ));
}

#[test]
fn configuration_errors() {
    assert_eq!(
        Config::from_pairs([("tl", "30")]).unwrap_err(),
        ConfigError::MissingExecPath
    );
    let dir = tempfile::tempdir().unwrap();
    assert!(config(dir.path(), &[("tl", "thirty")]).is_err());
    assert!(config(dir.path(), &[("ns", "0")]).is_err());
    let config = config(
        dir.path(),
        &[("do_reed_solomon", "true"), ("unknown_key", "whatever"), ("tl", "35")],
    )
    .unwrap();
    assert!(config.do_reed_solomon);
    assert_eq!(config.tl, 35);
}

#[test]
fn pages_without_osnma() {
    let dir = tempfile::tempdir().unwrap();
    let mut osnma = Osnma::new(config(dir.path(), &[]).unwrap()).unwrap();
    let start = Gst::new(1248, 345_600);
    let pages = (0..60).map(|j| silent_page(start.add_seconds(2 * j)));
    let summary = osnma.run(pages, None).unwrap();
    assert_eq!(summary.pages, 60);
    assert!(summary.first_fix.is_none());
    assert_eq!(osnma.stage(), StartStage::ColdStart);
    let late = silent_page(start.add_seconds(200));
    assert_ne!(osnma.process_page(&late).unwrap(), PageOutcome::Dropped);
}
