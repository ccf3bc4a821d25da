//! A small reference interpreter over [`LoopNestModel`].
//!
//! Pipelining transforms are only trustworthy if the rewritten nest computes
//! the same outputs as the canonical one, so the interpreter executes a model
//! literally: loops run their evaluated trip counts, steps read and write the
//! physical slot arrays through the exact slot selectors the body carries, and
//! guards are honoured per element. No transform-specific knowledge lives
//! here; if a rewrite misplaces a slot or a guard, the outputs diverge.

use snafu::OptionExt;

use crate::error::{MissingBindingSnafu, MissingInputSnafu, NegativeExtentSnafu, Result};
use crate::extent::DimEnv;
use crate::index::LoopEnv;
use crate::model::{BodyItem, LoopId, LoopNestModel, Stage, StageKind, Step};

struct Machine<'m> {
    model: &'m LoopNestModel,
    inputs: &'m [Vec<f64>],
    dims: &'m DimEnv,
    /// One flat buffer per slot array, `depth * elems` elements.
    slot_data: Vec<Vec<f64>>,
    outputs: Vec<Vec<f64>>,
}

/// Execute `model` over the given input buffers and dimension bindings,
/// returning one buffer per output index.
#[tracing::instrument(skip_all, fields(inputs = inputs.len()))]
pub fn run(model: &LoopNestModel, inputs: &[Vec<f64>], dims: &DimEnv) -> Result<Vec<Vec<f64>>> {
    let slot_data = model.slots().iter().map(|array| vec![0.0; array.len()]).collect();

    let mut outputs: Vec<Vec<f64>> = Vec::new();
    for stage in model.stages() {
        let StageKind::Store { output, .. } = stage.kind else { continue };
        let len = stage.domain.eval(dims)?;
        snafu::ensure!(len >= 0, NegativeExtentSnafu { extent: stage.domain.to_string(), value: len });
        if outputs.len() <= output {
            outputs.resize(output + 1, Vec::new());
        }
        outputs[output] = vec![0.0; len as usize];
    }

    let mut machine = Machine { model, inputs, dims, slot_data, outputs };
    let mut env = LoopEnv::new();
    machine.exec_items(model.roots(), &mut env)?;
    Ok(machine.outputs)
}

impl Machine<'_> {
    fn exec_items(&mut self, items: &[BodyItem], env: &mut LoopEnv) -> Result<()> {
        for item in items {
            match item {
                BodyItem::Loop(id) => self.exec_loop(*id, env)?,
                BodyItem::Step(step) => self.exec_step(step, env)?,
            }
        }
        Ok(())
    }

    fn exec_loop(&mut self, id: LoopId, env: &mut LoopEnv) -> Result<()> {
        let model = self.model;
        let looped = model.loop_(id);
        let trip = looped.extent.eval(self.dims)?;
        snafu::ensure!(trip >= 0, NegativeExtentSnafu { extent: looped.extent.to_string(), value: trip });
        for i in 0..trip {
            env.insert(id, i);
            self.exec_items(&looped.body, env)?;
        }
        env.remove(&id);
        Ok(())
    }

    /// Flat row-major row of a stage instance: the coordinates of all loops
    /// enclosing the stage's depth, with the coordinate along the step's own
    /// scheduling axis taken from the step's index expression. Prologue steps
    /// run outside their axis loop, so the missing coordinate is likewise the
    /// step's (constant) index.
    fn flat_row(&self, stage: &Stage, step: &Step, env: &LoopEnv) -> Result<i64> {
        let mut row = 0i64;
        for k in 0..stage.depth {
            let id = LoopId(k as u32);
            let coord = if step.index.var == Some(id) || !env.contains_key(&id) {
                step.index.eval(env)?
            } else {
                env[&id]
            };
            let extent = self.model.loop_(id).extent.eval(self.dims)?;
            row = row * extent + coord;
        }
        Ok(row)
    }

    fn exec_step(&mut self, step: &Step, env: &mut LoopEnv) -> Result<()> {
        let stage = self.model.stage(step.stage);
        let elems = stage.elems;
        let row = self.flat_row(stage, step, env)?;

        let write = match stage.kind {
            StageKind::Store { .. } => None,
            _ => {
                let name = self.model.tensor_name(stage.tensor);
                let binding =
                    self.model.binding(stage.tensor).context(MissingBindingSnafu { tensor: name.to_owned() })?;
                let slot = step.slot.as_ref().context(MissingBindingSnafu { tensor: name.to_owned() })?.eval(env)?;
                Some((binding.array.0 as usize, slot as i64 * elems))
            }
        };
        let read = match stage.kind.src_tensor() {
            None => None,
            Some(src) => {
                let name = self.model.tensor_name(src);
                let binding = self.model.binding(src).context(MissingBindingSnafu { tensor: name.to_owned() })?;
                let slot = step.read_slot.as_ref().context(MissingBindingSnafu { tensor: name.to_owned() })?.eval(env)?;
                Some((binding.array.0 as usize, slot as i64 * elems))
            }
        };

        for e in 0..elems {
            let live = match &step.guard {
                Some(guard) => guard.eval(env, e, self.dims)?,
                None => true,
            };
            match stage.kind {
                StageKind::Load { input, .. } => {
                    let (array, base) = write.unwrap_or_default();
                    // A masked-off load zero-fills its slot so downstream
                    // reads stay deterministic.
                    let value = if live {
                        let buffer = self.inputs.get(input).context(MissingInputSnafu { index: input })?;
                        self.checked(buffer, stage, row * elems + e)?
                    } else {
                        0.0
                    };
                    self.slot_data[array][(base + e) as usize] = value;
                }
                StageKind::Map { op, .. } => {
                    let (src_array, src_base) = read.unwrap_or_default();
                    let value = op.apply(self.slot_data[src_array][(src_base + e) as usize]);
                    let (array, base) = write.unwrap_or_default();
                    self.slot_data[array][(base + e) as usize] = value;
                }
                StageKind::Store { output, .. } => {
                    if !live {
                        continue;
                    }
                    let (src_array, src_base) = read.unwrap_or_default();
                    let value = self.slot_data[src_array][(src_base + e) as usize];
                    let at = row * elems + e;
                    self.checked_index(stage, at, self.outputs[output].len())?;
                    self.outputs[output][at as usize] = value;
                }
            }
        }
        Ok(())
    }

    fn checked(&self, buffer: &[f64], stage: &Stage, at: i64) -> Result<f64> {
        self.checked_index(stage, at, buffer.len())?;
        Ok(buffer[at as usize])
    }

    fn checked_index(&self, stage: &Stage, at: i64, len: usize) -> Result<()> {
        snafu::ensure!(at >= 0 && (at as usize) < len, crate::error::OutOfBoundsAccessSnafu {
            tensor: self.model.tensor_name(stage.tensor).to_owned(),
            index: at,
            len,
        });
        Ok(())
    }
}
