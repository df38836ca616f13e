//! DSM message collection.
//!
//! This module contains the [`CollectDsm`] struct, which is used to collect the
//! DSM blocks of the DSM messages being broadcast and recompose the messages.
//! Several DSMs can be collected at the same time. For each DSM type, only the
//! two most recently used DSM IDs are kept.

use crate::bitfields::{DsmHeader, DsmType};
use crate::types::{DSM_BLOCK_BYTES, DsmBlock};

const MAX_DSM_BLOCKS: usize = 16;
// Number of DSMs of each type kept in the collector
const DSMS_PER_TYPE: usize = 2;

/// DSM message.
///
/// This struct owns a copy of the data of a complete DSM.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Dsm {
    id: u8,
    data: Vec<u8>,
}

impl Dsm {
    /// Gives the DSM ID of the DSM.
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Gives the type of the DSM.
    pub fn dsm_type(&self) -> DsmType {
        DsmType::from_dsm_id(self.id)
    }

    /// Returns a slice containing the data of the DSM.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
struct PartialDsm {
    id: u8,
    blocks: [Option<DsmBlock>; MAX_DSM_BLOCKS],
    total: Option<usize>,
    done: bool,
    last_use: u64,
}

impl PartialDsm {
    fn new(id: u8, last_use: u64) -> PartialDsm {
        PartialDsm {
            id,
            blocks: [None; MAX_DSM_BLOCKS],
            total: None,
            done: false,
            last_use,
        }
    }

    fn dsm_type(&self) -> DsmType {
        DsmType::from_dsm_id(self.id)
    }

    fn received(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_some()).count()
    }

    fn assemble(&self, total: usize) -> Option<Vec<u8>> {
        let mut data = Vec::with_capacity(total * DSM_BLOCK_BYTES);
        for block in &self.blocks[..total] {
            data.extend_from_slice(block.as_ref()?);
        }
        Some(data)
    }
}

/// DSM message collector.
///
/// This struct collects DSM blocks and produces a complete DSM message when all
/// the blocks of the message have been collected. A complete DSM is produced
/// only once; it is produced again only if its blocks change or if it is
/// discarded with [`CollectDsm::discard`].
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
pub struct CollectDsm {
    dsms: Vec<PartialDsm>,
    clock: u64,
}

impl CollectDsm {
    /// Constructs a new, empty DSM collector.
    pub fn new() -> CollectDsm {
        CollectDsm::default()
    }

    /// Feed a new block into the DSM collector.
    ///
    /// If this block completes the DSM message, the recomposed message is
    /// returned. Otherwise, this returns `None`.
    ///
    /// The `header` parameter contains the DSM header of the block, and the
    /// `block` parameter contains the 13-byte DSM block.
    pub fn feed(&mut self, header: DsmHeader, block: &DsmBlock) -> Option<Dsm> {
        log::trace!("feeding header = {header:?}, block = {block:02x?}");
        self.clock += 1;
        let clock = self.clock;
        let dsm = self.get_or_insert(header.dsm_id());
        dsm.last_use = clock;
        let block_id = usize::from(header.dsm_block_id());
        match dsm.blocks[block_id] {
            Some(stored) if stored != *block => {
                log::warn!(
                    "DSM {} block {block_id} changed contents \
                     (stored = {stored:02x?}, received = {block:02x?}); restarting collection",
                    dsm.id
                );
                *dsm = PartialDsm::new(dsm.id, clock);
                dsm.blocks[block_id] = Some(*block);
            }
            Some(_) => log::trace!("DSM {} block {block_id} already stored", dsm.id),
            None => {
                dsm.blocks[block_id] = Some(*block);
                log::trace!("stored DSM {} block {block_id}", dsm.id);
            }
        }
        if block_id == 0 && dsm.total.is_none() {
            let nb = block[0] >> 4;
            dsm.total = dsm.dsm_type().number_of_blocks(nb);
            if dsm.total.is_none() {
                log::error!(
                    "reserved NB value {nb} for DSM {} of type {:?}",
                    dsm.id,
                    dsm.dsm_type()
                );
            }
        }
        if dsm.done {
            return None;
        }
        let Some(total) = dsm.total else {
            log::trace!(
                "DSM {} size unknown; {} blocks stored",
                dsm.id,
                dsm.received()
            );
            return None;
        };
        let data = dsm.assemble(total)?;
        dsm.done = true;
        log::info!(
            "completed DSM with id = {}, size = {} bytes",
            dsm.id,
            data.len()
        );
        log::trace!("DSM contents {data:02x?}");
        Some(Dsm { id: dsm.id, data })
    }

    fn get_or_insert(&mut self, id: u8) -> &mut PartialDsm {
        if let Some(pos) = self.dsms.iter().position(|d| d.id == id) {
            return &mut self.dsms[pos];
        }
        let dsm_type = DsmType::from_dsm_id(id);
        let same_type = self
            .dsms
            .iter()
            .filter(|d| d.dsm_type() == dsm_type)
            .count();
        if same_type >= DSMS_PER_TYPE
            && let Some((pos, _)) = self
                .dsms
                .iter()
                .enumerate()
                .filter(|(_, d)| d.dsm_type() == dsm_type)
                .min_by_key(|(_, d)| d.last_use)
        {
            let purged = self.dsms.swap_remove(pos);
            log::debug!(
                "purging DSM {} ({} blocks stored) to make room for DSM {id}",
                purged.id,
                purged.received()
            );
        }
        log::info!("new DSM id = {id}");
        self.dsms.push(PartialDsm::new(id, self.clock));
        let last = self.dsms.len() - 1;
        &mut self.dsms[last]
    }

    /// Discards a DSM, so that it is collected again from scratch.
    ///
    /// This is used when a complete DSM fails verification.
    pub fn discard(&mut self, id: u8) {
        self.dsms.retain(|d| d.id != id);
    }

    /// Returns the IDs of the DSMs currently being collected.
    pub fn dsm_ids(&self) -> Vec<u8> {
        self.dsms.iter().map(|d| d.id).collect()
    }
}
