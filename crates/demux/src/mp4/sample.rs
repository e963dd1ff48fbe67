//! Flat sample table, reconstructed from the stsz/stsc/stco/stts tables
//! (plus optional ctts and stss).

use tracing::{debug, warn};

use super::boxes::{ChunkRun, TimeRun};

/// One encoded access unit with a resolved byte range and timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub index: u32,
    /// Absolute byte offset in the container.
    pub offset: u64,
    pub size: u32,
    /// Presentation timestamp in media ticks (running DTS + composition offset).
    pub pts: u64,
    pub is_sync: bool,
    /// 0-based chunk this sample lives in.
    pub chunk_index: u32,
}

/// Raw table slices feeding the resolver. Empty optional tables (ctts, stss)
/// mean the box is absent: composition offsets default to 0 and no sample is
/// marked as a random-access point, not even index 0.
#[derive(Debug, Default, Clone, Copy)]
pub struct SampleTableInput<'a> {
    /// stsz global size; 0 means per-sample sizes are used.
    pub default_size: u32,
    /// stsz declared sample count.
    pub declared_count: u32,
    pub sizes: &'a [u32],
    pub chunk_runs: &'a [ChunkRun],
    pub chunk_offsets: &'a [u64],
    pub time_runs: &'a [TimeRun],
    pub composition_offsets: &'a [u32],
    pub sync_indices: &'a [u32],
}

/// Resolved, randomly-indexable sample list for one track.
#[derive(Debug, Clone)]
pub struct SampleTable {
    samples: Vec<Sample>,
    sync_indices: Vec<u32>,
}

impl SampleTable {
    /// Walk `0..declared_count` against the three run-length cursors (chunk
    /// grouping, chunk offsets, timing) with an intra-chunk byte accumulator.
    /// Terminates early when any driving table runs out; a shorter-than-
    /// declared list is a tolerated inconsistency, not an error.
    pub fn build(input: SampleTableInput<'_>) -> Self {
        let mut sync_indices = input.sync_indices.to_vec();
        sync_indices.sort_unstable();

        let mut samples = Vec::with_capacity(input.declared_count as usize);

        let mut run_idx = 0usize; // stsc cursor
        let mut chunk = 0usize; // current 0-based chunk
        let mut consumed_in_chunk = 0u32;
        let mut intra_offset = 0u64;

        let mut time_idx = 0usize; // stts cursor
        let mut consumed_in_run = 0u32;
        let mut dts = 0u64;

        for i in 0..input.declared_count {
            let size = if input.default_size > 0 {
                input.default_size
            } else {
                match input.sizes.get(i as usize) {
                    Some(&s) => s,
                    None => break, // size table exhausted
                }
            };
            let Some(run) = input.chunk_runs.get(run_idx) else {
                break; // chunk grouping exhausted
            };
            let Some(&chunk_offset) = input.chunk_offsets.get(chunk) else {
                break; // chunk offsets exhausted
            };
            let Some(time_run) = input.time_runs.get(time_idx) else {
                break; // timing exhausted
            };

            let pts = dts + u64::from(*input.composition_offsets.get(i as usize).unwrap_or(&0));
            samples.push(Sample {
                index: i,
                offset: chunk_offset + intra_offset,
                size,
                pts,
                is_sync: sync_indices.binary_search(&i).is_ok(),
                chunk_index: chunk as u32,
            });

            // advance the chunk grouping cursor
            intra_offset += u64::from(size);
            consumed_in_chunk += 1;
            if consumed_in_chunk >= run.samples_per_chunk {
                chunk += 1;
                consumed_in_chunk = 0;
                intra_offset = 0;
                if let Some(next) = input.chunk_runs.get(run_idx + 1) {
                    if next.first_chunk as usize == chunk + 1 {
                        run_idx += 1;
                    }
                }
            }

            // advance the timing cursor
            dts += u64::from(time_run.sample_delta);
            consumed_in_run += 1;
            if consumed_in_run >= time_run.sample_count {
                time_idx += 1;
                consumed_in_run = 0;
            }
        }

        if samples.len() < input.declared_count as usize {
            warn!(
                declared = input.declared_count,
                resolved = samples.len(),
                "sample tables ended early, truncating sample list"
            );
        } else {
            debug!(samples = samples.len(), "resolved sample table");
        }

        Self {
            samples,
            sync_indices,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, index: u32) -> Option<&Sample> {
        self.samples.get(index as usize)
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Random-access points, 0-based and sorted. Empty when the container
    /// declares none.
    pub fn sync_indices(&self) -> &[u32] {
        &self.sync_indices
    }

    /// Greatest sync index strictly below `target`, falling back to the
    /// first sync point when none qualifies. `None` only when the track has
    /// no random-access points at all.
    pub fn find_sync_before(&self, target: u32) -> Option<u32> {
        self.sync_indices
            .iter()
            .rev()
            .find(|&&s| s < target)
            .or_else(|| self.sync_indices.first())
            .copied()
    }
}
