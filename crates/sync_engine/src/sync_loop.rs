//! SynchronizationLoop
//!
//! One polling tick of the merge: walk the remaining scan points in order,
//! confirm each point once every module reports an id beyond the cursor, and
//! write the cross-module sum and the confirmed id into the output.

use container::{ArrayReader, ContainerWriter, Scalar};
use contracts::{layout, ContractError, Cursor, ScanGeometry, TickOutcome};
use tracing::{debug, instrument, trace};

use crate::source::{in_range, RawSource};

/// Per-tick merge of raw module progress into the output
pub struct SynchronizationLoop<'a> {
    geometry: &'a dyn ScanGeometry,
    missed_tolerance: u32,
}

impl<'a> SynchronizationLoop<'a> {
    pub fn new(geometry: &'a dyn ScanGeometry, missed_tolerance: u32) -> Self {
        Self {
            geometry,
            missed_tolerance,
        }
    }

    /// Run one tick
    ///
    /// Stops early when some module has not extended its arrays to the next
    /// point (`NotReady`) or when more than `missed_tolerance` points in this
    /// tick failed to advance the cursor (`Stalled`). A point that never
    /// advances is overtaken once a later point confirms. Any storage failure
    /// is returned as an error and leaves the cursor at the last flushed
    /// point.
    #[instrument(
        level = "debug",
        name = "sync_tick",
        skip(self, sources, output, cursor),
        fields(current_idx = cursor.current_idx, target_idx = cursor.target_idx)
    )]
    pub fn tick<R, W>(
        &self,
        sources: &mut [RawSource<R>],
        output: &mut W,
        cursor: &mut Cursor,
    ) -> Result<TickOutcome, ContractError>
    where
        R: ArrayReader,
        W: ContainerWriter,
    {
        if cursor.is_complete() {
            return Ok(TickOutcome::Complete);
        }

        let from = cursor.current_idx;
        cursor.clear_missed();
        for source in sources.iter_mut() {
            source.refresh_ids()?;
        }

        for index in cursor.remaining() {
            let coordinate = self.coordinate(index)?;

            if !all_have(sources, |s| s.has_id(&coordinate))? {
                trace!(index, "id not yet written by every module");
                return Ok(TickOutcome::NotReady {
                    from,
                    to: cursor.current_idx,
                    index,
                });
            }

            let min_id = min_id(sources, &coordinate)?;
            if min_id > cursor.current_idx as i64 {
                for source in sources.iter_mut() {
                    source.refresh_sums()?;
                }
                if !all_have(sources, |s| s.has_sum(&coordinate))? {
                    trace!(index, "sum not yet written by every module");
                    return Ok(TickOutcome::NotReady {
                        from,
                        to: cursor.current_idx,
                        index,
                    });
                }

                let total = sources
                    .iter()
                    .map(|s| s.read_sum(&coordinate))
                    .sum::<Result<f64, _>>()?;
                write_point(sources, output, &coordinate, min_id, total)?;
                cursor.advance(min_id as u64);
                debug!(index, min_id, total, "point confirmed");
            } else {
                observability::record_missed_observation();
                let missed = cursor.miss();
                trace!(index, min_id, missed, "point not advanced");
                if missed > self.missed_tolerance {
                    return Ok(TickOutcome::Stalled {
                        from,
                        to: cursor.current_idx,
                        index,
                    });
                }
            }
        }

        Ok(TickOutcome::Advanced {
            from,
            to: cursor.current_idx,
        })
    }

    fn coordinate(&self, index: u64) -> Result<Vec<usize>, ContractError> {
        self.geometry
            .coordinate(index as usize)
            .ok_or_else(|| ContractError::OutOfRange {
                dataset: "scan".to_string(),
                index: vec![index as usize],
                shape: self.geometry.shape().to_vec(),
            })
    }
}

fn all_have<R: ArrayReader>(
    sources: &[RawSource<R>],
    check: impl Fn(&RawSource<R>) -> Result<bool, ContractError>,
) -> Result<bool, ContractError> {
    for source in sources {
        if !check(source)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn min_id<R: ArrayReader>(
    sources: &[RawSource<R>],
    coordinate: &[usize],
) -> Result<i64, ContractError> {
    let mut min = i64::MAX;
    for source in sources {
        min = min.min(source.read_id(coordinate)?);
    }
    Ok(min)
}

/// Grow the output to the modules' extent, write both arrays and flush
fn write_point<R: ArrayReader, W: ContainerWriter>(
    sources: &[RawSource<R>],
    output: &mut W,
    coordinate: &[usize],
    min_id: i64,
    total: f64,
) -> Result<(), ContractError> {
    let current = output.shape(layout::UNIQUE_ID_PATH)?;
    let mut target = current.clone();
    for source in sources {
        for (len, observed) in target.iter_mut().zip(source.id_shape()?) {
            *len = (*len).max(observed);
        }
    }
    if !in_range(&target, coordinate) {
        return Err(ContractError::OutOfRange {
            dataset: layout::UNIQUE_ID_PATH.to_string(),
            index: coordinate.to_vec(),
            shape: target,
        });
    }
    if target != current {
        output.resize(layout::SUM_PATH, &target)?;
        output.resize(layout::UNIQUE_ID_PATH, &target)?;
    }

    output.write(layout::SUM_PATH, coordinate, Scalar::Float(total))?;
    output.write(layout::UNIQUE_ID_PATH, coordinate, Scalar::Int(min_id))?;
    output.flush()
}
