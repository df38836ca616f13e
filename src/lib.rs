//! # OSNMA receiver
//!
//! osnma-receiver is a Rust implementation of the receiver side of Galileo
//! OSNMA (Open Service Navigation Message Authentication). OSNMA lets a
//! receiver check that the I/NAV navigation data it uses was really
//! transmitted by the Galileo satellites. The data is authenticated with
//! TESLA: each satellite broadcasts MAC tags of the navigation data and,
//! some time later, the TESLA key used to compute them. The TESLA chain is
//! rooted in a KROOT signed with ECDSA, and the ECDSA public keys are in turn
//! authenticated with a Merkle tree.
//!
//! The [`Osnma`] struct implements the protocol as a black box. Pages are fed
//! to it as [`NavigationPage`] records, and the authenticated ephemeris,
//! clock and timing data can be requested at any time. Each stage of the
//! protocol is also available on its own:
//!
//! * [`subframe`], [`regenerator`] and [`dsm`] reassemble the HKROOT and MACK
//!   messages and the DSMs carried in HKROOT.
//! * [`bitfields`], [`pubkey`] and [`merkle_tree`] verify DSM-KROOTs and
//!   DSM-PKRs.
//! * [`tesla`] verifies TESLA keys, and [`mack`], [`maclt`] and [`tags`]
//!   verify the tags of MACK messages.
//! * [`navmessage`] keeps the navigation data that tags authenticate, with
//!   optional [`reed_solomon`] recovery of missing words.
//! * [`status`] decides what to do with the TESLA chains when the NMA header
//!   changes.
//!
//! ## Configuration and key material
//!
//! A receiver is built from a [`Config`], which names the directory holding
//! the Merkle tree, public key and stored DSM-KROOT files. See
//! [`key_material`] for the file formats.
//!
//! ## Logging
//!
//! The crate makes extensive use of the [log](https://docs.rs/log/latest/log/)
//! crate to log events related to the processing of the messages and the
//! cryptographic functions.
//!
//! ## Features
//!
//! * `cli`. Builds the `osnma-test-vectors` tool, which runs test vector
//!   files through the receiver.

#![warn(missing_docs)]

pub mod bitfields;
pub mod bits;
pub mod config;
pub use config::{Config, ConfigError};
pub mod dsm;
mod gst;
pub use gst::{Gst, Tow, Wn};
pub mod key_material;
pub mod mack;
pub mod maclt;
pub mod merkle_tree;
pub mod navmessage;
mod osnma;
pub use osnma::{FirstFix, Osnma, OsnmaError, PageOutcome, RunSummary};
pub mod pubkey;
pub mod reed_solomon;
pub mod regenerator;
pub mod status;
pub mod subframe;
mod svn;
pub use svn::{DUMMY_PRN, Prn, Svn, SvnError};
pub mod tags;
pub mod tesla;
pub mod types;
pub use types::{InavBand, NavigationPage};
pub mod validation;
