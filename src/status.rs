//! Receiver status transitions.
//!
//! [`chain_status_handler`] decides what the receiver does with its TESLA
//! chains given the start stage, the chain and public key status stored from
//! previous subframes, the NMA header of the current subframe and, if one was
//! just verified, the chain ID of a DSM-KROOT. It has no side effects: the
//! returned [`StatusAction`] is applied by [`Osnma`](crate::Osnma).
//!
//! The set of legal inputs is closed. Combinations that are not listed below
//! produce a [`ReceiverStatusError`].
//!
//! | start stage | stored CPKS | NMAS | CPKS | action |
//! |---|---|---|---|---|
//! | any | any | don't use | PKREV | [`StatusAction::FallbackCold`] |
//! | any | any | don't use | CREV | [`StatusAction::FallbackWarm`] |
//! | any | any | don't use | NOMINAL, EOC, NPK | [`StatusAction::Suspend`] |
//! | not started | any | test, operational | NOMINAL, NPK, CREV | install KROOT of the header CID |
//! | not started | any | test, operational | EOC, PKREV | install KROOT of the header CID, cache any other |
//! | not started | any | test, operational | any | promote the next chain once the header names it |
//! | started | NOMINAL, CREV, PKREV, NPK | test, operational | NOMINAL, NPK, PKREV | update in place, replace on a new CID |
//! | started | any | test, operational | EOC | cache the next chain |
//! | started | EOC | test, operational | NOMINAL, NPK | switch to the next chain |
//! | started | CREV | test, operational | CREV | install KROOT of the header CID |

use crate::bitfields::{ChainAndPubkeyStatus, NmaHeader, NmaStatus};
use core::fmt;

/// Start stage of the receiver.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum StartStage {
    /// No public key and no KROOT.
    ColdStart,
    /// Public key, but no KROOT.
    WarmStart,
    /// Public key and a stored KROOT that has not verified a TESLA key yet.
    HotStart,
    /// A TESLA chain is in force.
    Started,
}

impl StartStage {
    /// Returns `true` for [`StartStage::Started`].
    pub fn is_started(&self) -> bool {
        *self == StartStage::Started
    }
}

impl fmt::Display for StartStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StartStage::ColdStart => "COLD_START",
            StartStage::WarmStart => "WARM_START",
            StartStage::HotStart => "HOT_START",
            StartStage::Started => "STARTED",
        };
        f.write_str(name)
    }
}

/// Inputs of [`chain_status_handler`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct StatusInput {
    /// Current start stage.
    pub stage: StartStage,
    /// CPKS stored from previous subframes.
    pub stored_status: ChainAndPubkeyStatus,
    /// NMA status of the current subframe.
    pub nma_status: NmaStatus,
    /// CPKS of the current subframe.
    pub cpks: ChainAndPubkeyStatus,
    /// Chain ID in the NMA header of the current subframe.
    pub header_cid: u8,
    /// Chain ID of the DSM-KROOT verified in this subframe, if any.
    pub kroot_cid: Option<u8>,
    /// Chain ID of the chain in force, if any.
    pub installed_cid: Option<u8>,
    /// Chain ID of the cached next chain, if any.
    pub next_cid: Option<u8>,
}

impl StatusInput {
    /// Fills the fields that come from the NMA header.
    pub fn from_header(
        stage: StartStage,
        stored_status: ChainAndPubkeyStatus,
        nma_header: NmaHeader,
    ) -> StatusInput {
        StatusInput {
            stage,
            stored_status,
            nma_status: nma_header.nma_status(),
            cpks: nma_header.chain_and_pubkey_status(),
            header_cid: nma_header.chain_id(),
            kroot_cid: None,
            installed_cid: None,
            next_cid: None,
        }
    }
}

/// What the receiver must do with its chains.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum StatusAction {
    /// Nothing to do.
    Nothing,
    /// NMA is suspended: keep all the state but do not authenticate.
    Suspend,
    /// Install the received KROOT as the chain in force and become started.
    Install,
    /// Keep the received KROOT as the next chain.
    CacheNext,
    /// Make the cached next chain the chain in force.
    SwitchToNext,
    /// The received KROOT belongs to the chain in force; refresh it.
    UpdateInPlace,
    /// The received KROOT replaces the chain in force.
    Replace,
    /// Drop all key material and go back to cold start.
    FallbackCold,
    /// Drop the TESLA chains and go back to warm start.
    FallbackWarm,
}

/// Illegal combination of receiver status and NMA header.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, thiserror::Error)]
#[error(
    "illegal receiver status: stage {}, stored CPKS {:?}, NMAS {:?}, CPKS {:?}, \
     header CID {}, KROOT CID {:?}, chain in force {:?}, next chain {:?}",
    input.stage,
    input.stored_status,
    input.nma_status,
    input.cpks,
    input.header_cid,
    input.kroot_cid,
    input.installed_cid,
    input.next_cid
)]
pub struct ReceiverStatusError {
    /// The rejected input.
    pub input: StatusInput,
}

/// Decides the chain action for a subframe.
pub fn chain_status_handler(input: &StatusInput) -> Result<StatusAction, ReceiverStatusError> {
    use ChainAndPubkeyStatus::*;
    let error = Err(ReceiverStatusError { input: *input });
    let kroot_matches_header = input.kroot_cid == Some(input.header_cid);

    match input.nma_status {
        NmaStatus::DontUse => {
            return match input.cpks {
                PublicKeyRevoked => Ok(StatusAction::FallbackCold),
                ChainRevoked => Ok(StatusAction::FallbackWarm),
                Nominal | EndOfChain | NewPublicKey => Ok(StatusAction::Suspend),
                Reserved => error,
            };
        }
        NmaStatus::Test | NmaStatus::Operational => (),
        NmaStatus::Reserved => return error,
    }

    if !input.stage.is_started() {
        return match (input.cpks, input.kroot_cid) {
            (Reserved, _) => error,
            (_, None) if input.next_cid == Some(input.header_cid) => {
                Ok(StatusAction::SwitchToNext)
            }
            (_, None) => Ok(StatusAction::Nothing),
            (_, Some(_)) if kroot_matches_header => Ok(StatusAction::Install),
            (EndOfChain | PublicKeyRevoked, Some(_)) => Ok(StatusAction::CacheNext),
            (Nominal | NewPublicKey | ChainRevoked, Some(_)) => Ok(StatusAction::Nothing),
        };
    }

    match (input.stored_status, input.cpks) {
        (_, EndOfChain) => match input.kroot_cid {
            Some(cid) if Some(cid) == input.installed_cid => Ok(StatusAction::UpdateInPlace),
            Some(_) => Ok(StatusAction::CacheNext),
            None => Ok(StatusAction::Nothing),
        },
        (EndOfChain, Nominal | NewPublicKey) => {
            if input.installed_cid == Some(input.header_cid) {
                // Already switched
                Ok(match input.kroot_cid {
                    Some(cid) if Some(cid) == input.installed_cid => StatusAction::UpdateInPlace,
                    _ => StatusAction::Nothing,
                })
            } else if input.next_cid == Some(input.header_cid) {
                Ok(StatusAction::SwitchToNext)
            } else if kroot_matches_header {
                Ok(StatusAction::Replace)
            } else {
                error
            }
        }
        (Nominal | ChainRevoked | PublicKeyRevoked | NewPublicKey,
         Nominal | NewPublicKey | PublicKeyRevoked) => match input.kroot_cid {
            Some(cid) if Some(cid) == input.installed_cid => Ok(StatusAction::UpdateInPlace),
            Some(_) => Ok(StatusAction::Replace),
            None if input.installed_cid == Some(input.header_cid) => Ok(StatusAction::Nothing),
            None => error,
        },
        (ChainRevoked, ChainRevoked) => {
            if input.installed_cid == Some(input.header_cid) {
                Ok(StatusAction::Nothing)
            } else if kroot_matches_header {
                Ok(StatusAction::Replace)
            } else {
                error
            }
        }
        _ => error,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ChainAndPubkeyStatus::*;

    const STAGES: [StartStage; 4] = [
        StartStage::ColdStart,
        StartStage::WarmStart,
        StartStage::HotStart,
        StartStage::Started,
    ];
    const CPKS: [ChainAndPubkeyStatus; 6] = [
        Reserved,
        Nominal,
        EndOfChain,
        ChainRevoked,
        NewPublicKey,
        PublicKeyRevoked,
    ];
    const NMAS: [NmaStatus; 4] = [
        NmaStatus::Reserved,
        NmaStatus::Test,
        NmaStatus::Operational,
        NmaStatus::DontUse,
    ];

    #[derive(Copy, Clone)]
    enum Stages {
        Any,
        NotStarted,
        Started,
    }

    impl Stages {
        fn contains(self, stage: StartStage) -> bool {
            match self {
                Stages::Any => true,
                Stages::NotStarted => !stage.is_started(),
                Stages::Started => stage.is_started(),
            }
        }
    }

    type Row = (
        Stages,
        &'static [ChainAndPubkeyStatus],
        &'static [NmaStatus],
        &'static [ChainAndPubkeyStatus],
    );

    const IN_USE: &[NmaStatus] = &[NmaStatus::Test, NmaStatus::Operational];
    const DONT_USE: &[NmaStatus] = &[NmaStatus::DontUse];
    const ANY: &[ChainAndPubkeyStatus] = &CPKS;

    // Rows of the transition table: start stage, stored CPKS, NMAS, CPKS
    const ROWS: &[Row] = &[
        (Stages::Any, ANY, DONT_USE, &[PublicKeyRevoked]),
        (Stages::Any, ANY, DONT_USE, &[ChainRevoked]),
        (Stages::Any, ANY, DONT_USE, &[Nominal, EndOfChain, NewPublicKey]),
        (Stages::NotStarted, ANY, IN_USE, &[Nominal, NewPublicKey, ChainRevoked]),
        (Stages::NotStarted, ANY, IN_USE, &[EndOfChain, PublicKeyRevoked]),
        (
            Stages::Started,
            &[Nominal, ChainRevoked, PublicKeyRevoked, NewPublicKey],
            IN_USE,
            &[Nominal, NewPublicKey, PublicKeyRevoked],
        ),
        (Stages::Started, ANY, IN_USE, &[EndOfChain]),
        (Stages::Started, &[EndOfChain], IN_USE, &[Nominal, NewPublicKey]),
        (Stages::Started, &[ChainRevoked], IN_USE, &[ChainRevoked]),
    ];

    fn in_table(input: &StatusInput) -> bool {
        ROWS.iter().any(|(stages, stored, nmas, cpks)| {
            stages.contains(input.stage)
                && stored.contains(&input.stored_status)
                && nmas.contains(&input.nma_status)
                && cpks.contains(&input.cpks)
        })
    }

    fn all_inputs() -> impl Iterator<Item = StatusInput> {
        let cids = [None, Some(0u8), Some(1), Some(2), Some(3)];
        STAGES.into_iter().flat_map(move |stage| {
            CPKS.into_iter().flat_map(move |stored_status| {
                NMAS.into_iter().flat_map(move |nma_status| {
                    CPKS.into_iter().flat_map(move |cpks| {
                        (0..4u8).flat_map(move |header_cid| {
                            cids.into_iter().flat_map(move |kroot_cid| {
                                cids.into_iter().flat_map(move |installed_cid| {
                                    cids.into_iter().map(move |next_cid| StatusInput {
                                        stage,
                                        stored_status,
                                        nma_status,
                                        cpks,
                                        header_cid,
                                        kroot_cid,
                                        installed_cid,
                                        next_cid,
                                    })
                                })
                            })
                        })
                    })
                })
            })
        })
    }

    #[test]
    fn inputs_outside_table_rejected() {
        let mut count = 0;
        for input in all_inputs() {
            count += 1;
            let result = chain_status_handler(&input);
            if !in_table(&input) {
                assert_eq!(
                    result,
                    Err(ReceiverStatusError { input }),
                    "input outside the table accepted: {input:?}"
                );
            }
            if let Err(e) = result {
                assert_eq!(e.input, input);
            }
        }
        assert_eq!(count, 4 * 6 * 4 * 6 * 4 * 5 * 5 * 5);
    }

    use StartStage::{ColdStart as Cold, HotStart as Hot, Started as Run, WarmStart as Warm};
    use StatusAction as A;
    const OP: NmaStatus = NmaStatus::Operational;
    const TEST: NmaStatus = NmaStatus::Test;
    const DU: NmaStatus = NmaStatus::DontUse;

    // stage, stored CPKS, NMAS, CPKS, header CID, KROOT CID, chain in force,
    // next chain, expected action (None for an error)
    type Case = (
        StartStage,
        ChainAndPubkeyStatus,
        NmaStatus,
        ChainAndPubkeyStatus,
        u8,
        Option<u8>,
        Option<u8>,
        Option<u8>,
        Option<StatusAction>,
    );

    #[rustfmt::skip]
    const CASES: &[Case] = &[
        // don't use, PKREV: drop all key material
        (Cold, Nominal, DU, PublicKeyRevoked, 1, None, None, None, Some(A::FallbackCold)),
        (Run, EndOfChain, DU, PublicKeyRevoked, 1, Some(1), Some(1), Some(2), Some(A::FallbackCold)),
        // don't use, CREV: drop chains
        (Warm, Nominal, DU, ChainRevoked, 1, None, None, None, Some(A::FallbackWarm)),
        (Run, Nominal, DU, ChainRevoked, 1, None, Some(1), None, Some(A::FallbackWarm)),
        // don't use, NOMINAL, EOC, NPK: suspend
        (Run, Nominal, DU, Nominal, 2, None, Some(1), None, Some(A::Suspend)),
        (Hot, Nominal, DU, EndOfChain, 1, Some(2), Some(1), None, Some(A::Suspend)),
        (Warm, Nominal, DU, NewPublicKey, 1, None, None, None, Some(A::Suspend)),
        // not started, NOMINAL, NPK, CREV
        (Warm, Nominal, OP, Nominal, 1, Some(1), None, None, Some(A::Install)),
        (Cold, Nominal, TEST, NewPublicKey, 2, Some(2), None, None, Some(A::Install)),
        (Hot, ChainRevoked, OP, ChainRevoked, 1, Some(1), Some(1), None, Some(A::Install)),
        (Warm, Nominal, OP, Nominal, 1, None, None, None, Some(A::Nothing)),
        (Warm, Nominal, OP, Nominal, 1, Some(2), None, None, Some(A::Nothing)),
        // not started, EOC, PKREV
        (Warm, Nominal, OP, EndOfChain, 1, Some(1), None, None, Some(A::Install)),
        (Warm, Nominal, OP, EndOfChain, 1, Some(2), None, None, Some(A::CacheNext)),
        (Hot, Nominal, TEST, PublicKeyRevoked, 1, Some(3), Some(1), None, Some(A::CacheNext)),
        // not started, cached next chain named by the header
        (Warm, EndOfChain, OP, Nominal, 2, None, None, Some(2), Some(A::SwitchToNext)),
        (Hot, EndOfChain, OP, NewPublicKey, 2, None, Some(1), Some(2), Some(A::SwitchToNext)),
        // started, nominal
        (Run, Nominal, OP, Nominal, 1, None, Some(1), None, Some(A::Nothing)),
        (Run, Nominal, OP, Nominal, 1, Some(1), Some(1), None, Some(A::UpdateInPlace)),
        (Run, NewPublicKey, OP, NewPublicKey, 2, Some(2), Some(1), None, Some(A::Replace)),
        (Run, Nominal, OP, Nominal, 1, Some(3), Some(1), None, Some(A::Replace)),
        (Run, PublicKeyRevoked, TEST, PublicKeyRevoked, 2, None, Some(1), None, None),
        // started, EOC
        (Run, Nominal, OP, EndOfChain, 1, Some(2), Some(1), None, Some(A::CacheNext)),
        (Run, EndOfChain, OP, EndOfChain, 1, Some(1), Some(1), Some(2), Some(A::UpdateInPlace)),
        (Run, EndOfChain, OP, EndOfChain, 1, None, Some(1), Some(2), Some(A::Nothing)),
        // started, EOC to NOMINAL or NPK
        (Run, EndOfChain, OP, Nominal, 2, None, Some(1), Some(2), Some(A::SwitchToNext)),
        (Run, EndOfChain, OP, NewPublicKey, 2, Some(2), Some(1), None, Some(A::Replace)),
        (Run, EndOfChain, OP, Nominal, 2, None, Some(1), Some(3), None),
        // started, CREV to CREV
        (Run, ChainRevoked, OP, ChainRevoked, 2, Some(2), Some(1), None, Some(A::Replace)),
        (Run, ChainRevoked, OP, ChainRevoked, 1, None, Some(1), None, Some(A::Nothing)),
        (Run, ChainRevoked, OP, ChainRevoked, 2, None, Some(1), None, None),
        // outside the table
        (Run, Nominal, OP, ChainRevoked, 1, None, Some(1), None, None),
        (Run, EndOfChain, OP, PublicKeyRevoked, 1, None, Some(1), None, None),
        (Warm, Nominal, NmaStatus::Reserved, Nominal, 1, Some(1), None, None, None),
        (Warm, Nominal, OP, Reserved, 1, Some(1), None, None, None),
        (Run, Nominal, DU, Reserved, 1, None, Some(1), None, None),
    ];

    #[test]
    fn transition_table() {
        for case in CASES {
            let &(
                stage,
                stored_status,
                nma_status,
                cpks,
                header_cid,
                kroot_cid,
                installed_cid,
                next_cid,
                expected,
            ) = case;
            let input = StatusInput {
                stage,
                stored_status,
                nma_status,
                cpks,
                header_cid,
                kroot_cid,
                installed_cid,
                next_cid,
            };
            let result = chain_status_handler(&input);
            match expected {
                Some(action) => assert_eq!(result, Ok(action), "{input:?}"),
                None => assert_eq!(result, Err(ReceiverStatusError { input }), "{input:?}"),
            }
        }
    }

    fn started(stored: ChainAndPubkeyStatus, cpks: ChainAndPubkeyStatus) -> StatusInput {
        StatusInput {
            stage: StartStage::Started,
            stored_status: stored,
            nma_status: NmaStatus::Operational,
            cpks,
            header_cid: 1,
            kroot_cid: None,
            installed_cid: Some(1),
            next_cid: None,
        }
    }

    #[test]
    fn dont_use() {
        for stage in STAGES {
            let input = StatusInput {
                stage,
                nma_status: NmaStatus::DontUse,
                ..started(Nominal, PublicKeyRevoked)
            };
            assert_eq!(chain_status_handler(&input), Ok(StatusAction::FallbackCold));
            let input = StatusInput {
                cpks: ChainRevoked,
                ..input
            };
            assert_eq!(chain_status_handler(&input), Ok(StatusAction::FallbackWarm));
            let input = StatusInput {
                cpks: EndOfChain,
                ..input
            };
            assert_eq!(chain_status_handler(&input), Ok(StatusAction::Suspend));
        }
    }

    #[test]
    fn not_started() {
        let waiting = StatusInput {
            stage: StartStage::WarmStart,
            installed_cid: None,
            ..started(Nominal, Nominal)
        };
        assert_eq!(chain_status_handler(&waiting), Ok(StatusAction::Nothing));
        let kroot = StatusInput {
            kroot_cid: Some(1),
            ..waiting
        };
        assert_eq!(chain_status_handler(&kroot), Ok(StatusAction::Install));
        let other = StatusInput {
            kroot_cid: Some(2),
            ..waiting
        };
        assert_eq!(chain_status_handler(&other), Ok(StatusAction::Nothing));
        let cached = StatusInput {
            header_cid: 2,
            next_cid: Some(2),
            ..waiting
        };
        assert_eq!(chain_status_handler(&cached), Ok(StatusAction::SwitchToNext));
        let eoc = StatusInput {
            cpks: EndOfChain,
            ..other
        };
        assert_eq!(chain_status_handler(&eoc), Ok(StatusAction::CacheNext));
        let reserved = StatusInput {
            nma_status: NmaStatus::Reserved,
            ..kroot
        };
        assert!(chain_status_handler(&reserved).is_err());
    }

    #[test]
    fn nominal() {
        let input = started(Nominal, Nominal);
        assert_eq!(chain_status_handler(&input), Ok(StatusAction::Nothing));
        let refresh = StatusInput {
            kroot_cid: Some(1),
            ..input
        };
        assert_eq!(chain_status_handler(&refresh), Ok(StatusAction::UpdateInPlace));
        let replace = StatusInput {
            header_cid: 2,
            kroot_cid: Some(2),
            ..input
        };
        assert_eq!(chain_status_handler(&replace), Ok(StatusAction::Replace));
        let mismatch = StatusInput {
            header_cid: 2,
            ..input
        };
        assert!(chain_status_handler(&mismatch).is_err());
        let unseen = StatusInput {
            kroot_cid: Some(3),
            ..input
        };
        assert_eq!(chain_status_handler(&unseen), Ok(StatusAction::Replace));
        // CREV with the NMA in use is not expected while nominal
        assert!(chain_status_handler(&started(Nominal, ChainRevoked)).is_err());
    }

    #[test]
    fn end_of_chain() {
        let eoc = StatusInput {
            kroot_cid: Some(2),
            ..started(Nominal, EndOfChain)
        };
        assert_eq!(chain_status_handler(&eoc), Ok(StatusAction::CacheNext));
        let switch = StatusInput {
            header_cid: 2,
            next_cid: Some(2),
            ..started(EndOfChain, Nominal)
        };
        assert_eq!(chain_status_handler(&switch), Ok(StatusAction::SwitchToNext));
        let from_kroot = StatusInput {
            header_cid: 2,
            kroot_cid: Some(2),
            ..started(EndOfChain, Nominal)
        };
        assert_eq!(chain_status_handler(&from_kroot), Ok(StatusAction::Replace));
        let lost = StatusInput {
            header_cid: 2,
            next_cid: Some(3),
            ..started(EndOfChain, NewPublicKey)
        };
        assert!(chain_status_handler(&lost).is_err());
        assert!(chain_status_handler(&started(EndOfChain, PublicKeyRevoked)).is_err());
    }

    #[test]
    fn chain_revoked() {
        assert_eq!(
            chain_status_handler(&started(ChainRevoked, ChainRevoked)),
            Ok(StatusAction::Nothing)
        );
        let new = StatusInput {
            header_cid: 3,
            kroot_cid: Some(3),
            ..started(ChainRevoked, ChainRevoked)
        };
        assert_eq!(chain_status_handler(&new), Ok(StatusAction::Replace));
        let missing = StatusInput {
            header_cid: 3,
            ..started(ChainRevoked, ChainRevoked)
        };
        assert!(chain_status_handler(&missing).is_err());
    }
}
