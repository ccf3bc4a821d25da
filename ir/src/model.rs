//! The loop/stage model consumed and produced by the rotation pass.
//!
//! The dependency structure is an explicit arena: loops, stages, tensors and
//! slot arrays live in `Vec`s owned by [`LoopNestModel`] and reference each
//! other through integer ids. Nothing is pointer-linked, so a pass can clone
//! and splice subtrees (prologue peeling, body rewrites) without aliasing
//! hazards, and the input model is never mutated in place: transformations
//! build a fresh model via [`LoopNestModel::rebuilt`].

use std::collections::HashMap;

use smallvec::SmallVec;

use snafu::OptionExt;

use crate::error::{
    DepthOutOfRangeSnafu, ElemCountMismatchSnafu, MissingProducerSnafu, MultipleProducersSnafu, Result,
};
use crate::extent::Extent;
use crate::index::{IndexExpr, Predicate, SlotIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u32);

/// How a load stage moves data: a plain copy, or an asynchronous copy whose
/// completion is observed through a barrier wait emitted downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMechanism {
    Sync,
    Async,
}

/// Elementwise compute applied by a [`StageKind::Map`] stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ElemOp {
    Identity,
    Neg,
    Scale(f64),
    Offset(f64),
}

impl ElemOp {
    pub fn apply(self, v: f64) -> f64 {
        match self {
            Self::Identity => v,
            Self::Neg => -v,
            Self::Scale(c) => v * c,
            Self::Offset(c) => v + c,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageKind {
    /// Read one instance worth of elements from external input buffer `input`.
    Load { input: usize, mechanism: CopyMechanism },
    /// Elementwise compute over another tensor's current instance.
    Map { src: TensorId, op: ElemOp },
    /// Write one instance worth of elements to external output buffer `output`.
    Store { src: TensorId, output: usize },
}

impl StageKind {
    /// The buffered operand read by this stage, if any.
    pub fn src_tensor(&self) -> Option<TensorId> {
        match self {
            Self::Load { .. } => None,
            Self::Map { src, .. } | Self::Store { src, .. } => Some(*src),
        }
    }
}

/// A single-assignment computation producing one tensor value per instance.
#[derive(Debug, Clone)]
pub struct Stage {
    /// The tensor this stage produces. For stores this names the external
    /// output tensor; no slot storage is allocated for it.
    pub tensor: TensorId,
    pub kind: StageKind,
    /// Number of enclosing loops at the stage's compute position. Loops nested
    /// below this position are abstracted by `elems`.
    pub depth: usize,
    /// Elements produced per stage instance.
    pub elems: i64,
    /// Flat element bound of the stage's pre-rotation domain. For exact
    /// schedules this equals the product of loop extents times `elems`; for
    /// merge+split schedules it is the unpadded merged size.
    pub domain: Extent,
    pub idempotent: bool,
    pub side_effecting: bool,
}

/// Per-tensor stage count: 1 = unbuffered, 2 = double, D = circular depth D.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferingPolicy {
    depth: u32,
}

impl BufferingPolicy {
    pub const fn unbuffered() -> Self {
        Self { depth: 1 }
    }

    pub const fn double() -> Self {
        Self { depth: 2 }
    }

    pub fn circular(depth: u32) -> Self {
        Self { depth: depth.max(1) }
    }

    pub fn depth(self) -> u32 {
        self.depth
    }

    pub fn is_multi_slot(self) -> bool {
        self.depth > 1
    }
}

#[derive(Debug, Clone)]
pub struct TensorDecl {
    pub name: String,
    pub buffering: BufferingPolicy,
}

#[derive(Debug, Clone)]
pub struct Loop {
    pub name: String,
    pub extent: Extent,
    pub unroll: bool,
    pub body: SmallVec<[BodyItem; 4]>,
}

/// One scheduled stage instance inside a body.
///
/// `index` supplies the stage's coordinate along the (possibly shifted)
/// scheduling loop; prologue steps use absolute constants because no loop
/// variable is in scope. `guard` is present on memory steps whose access can
/// fall outside the pre-rotation domain. `slot` selects the physical slot the
/// produced value lands in and `read_slot` the slot the operand is read from.
#[derive(Debug, Clone)]
pub struct Step {
    pub stage: StageId,
    pub index: IndexExpr,
    pub guard: Option<Predicate>,
    pub slot: Option<SlotIndex>,
    pub read_slot: Option<SlotIndex>,
}

#[derive(Debug, Clone)]
pub enum BodyItem {
    Loop(LoopId),
    Step(Step),
}

/// Physical storage for one tensor: `depth` slots of `elems` elements each,
/// reused cyclically. Arrays are tensor-scoped; two tensors never share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotArray {
    pub tensor: TensorId,
    pub elems: i64,
    pub depth: u32,
}

impl SlotArray {
    pub fn len(&self) -> usize {
        self.depth as usize * self.elems as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Indirection from a logical tensor to its physical slot array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotBinding {
    pub array: SlotId,
}

/// Bookkeeping for an asynchronous-copy pipeline, consumed by the downstream
/// barrier-wait emission: at steady state `steady_in_flight` copies are
/// outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncPipeline {
    pub tensor: TensorId,
    pub depth: u32,
    pub steady_in_flight: u32,
}

/// The loop-nest model: arenas plus the ordered body tree.
///
/// Loops are declared outermost-first and form a single nest path, so
/// `LoopId(k)` sits at nest depth `k + 1`.
#[derive(Debug, Clone)]
pub struct LoopNestModel {
    loops: Vec<Loop>,
    stages: Vec<Stage>,
    tensors: Vec<TensorDecl>,
    slots: Vec<SlotArray>,
    bindings: HashMap<TensorId, SlotBinding>,
    pipelines: Vec<AsyncPipeline>,
    roots: SmallVec<[BodyItem; 4]>,
    producers: HashMap<TensorId, StageId>,
}

impl LoopNestModel {
    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }

    pub fn loop_(&self, id: LoopId) -> &Loop {
        &self.loops[id.0 as usize]
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage(&self, id: StageId) -> &Stage {
        &self.stages[id.0 as usize]
    }

    pub fn stage_entries(&self) -> impl Iterator<Item = (StageId, &Stage)> {
        self.stages.iter().enumerate().map(|(i, s)| (StageId(i as u32), s))
    }

    pub fn tensor(&self, id: TensorId) -> &TensorDecl {
        &self.tensors[id.0 as usize]
    }

    pub fn tensor_name(&self, id: TensorId) -> &str {
        &self.tensor(id).name
    }

    pub fn buffering(&self, id: TensorId) -> BufferingPolicy {
        self.tensor(id).buffering
    }

    pub fn tensor_count(&self) -> usize {
        self.tensors.len()
    }

    pub fn slots(&self) -> &[SlotArray] {
        &self.slots
    }

    pub fn binding(&self, tensor: TensorId) -> Option<SlotBinding> {
        self.bindings.get(&tensor).copied()
    }

    /// The physical slot array backing `tensor`, if it has buffered storage.
    pub fn storage_of(&self, tensor: TensorId) -> Option<&SlotArray> {
        self.binding(tensor).map(|b| &self.slots[b.array.0 as usize])
    }

    pub fn pipelines(&self) -> &[AsyncPipeline] {
        &self.pipelines
    }

    pub fn roots(&self) -> &[BodyItem] {
        &self.roots
    }

    pub fn producer_of(&self, tensor: TensorId) -> Option<StageId> {
        self.producers.get(&tensor).copied()
    }

    pub fn consumers_of(&self, tensor: TensorId) -> Vec<StageId> {
        self.stage_entries().filter(|(_, s)| s.kind.src_tensor() == Some(tensor)).map(|(id, _)| id).collect()
    }

    /// Nest depth of a loop: 1 for the outermost, `loops.len()` for the innermost.
    pub fn nest_depth(&self, id: LoopId) -> Option<usize> {
        ((id.0 as usize) < self.loops.len()).then(|| id.0 as usize + 1)
    }

    /// Build a new model with the same stages and tensors but fresh loops,
    /// storage tables and body tree. This is how passes produce their output
    /// without touching the input.
    pub fn rebuilt(
        &self,
        loops: Vec<Loop>,
        slots: Vec<SlotArray>,
        bindings: HashMap<TensorId, SlotBinding>,
        pipelines: Vec<AsyncPipeline>,
        roots: SmallVec<[BodyItem; 4]>,
    ) -> Self {
        Self {
            loops,
            stages: self.stages.clone(),
            tensors: self.tensors.clone(),
            slots,
            bindings,
            pipelines,
            roots,
            producers: self.producers.clone(),
        }
    }
}

/// Builder for an input model with the canonical (unrotated) body layout.
///
/// Declare loops outermost-first, then tensors, then stages in program order;
/// [`NestBuilder::finish`] validates the single-assignment discipline, lays the
/// stages out in their loops, and allocates default single-slot storage.
#[derive(Debug, Default)]
pub struct NestBuilder {
    loops: Vec<Loop>,
    stages: Vec<Stage>,
    tensors: Vec<TensorDecl>,
}

impl NestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loop_(&mut self, name: impl Into<String>, extent: Extent, unroll: bool) -> LoopId {
        self.loops.push(Loop { name: name.into(), extent, unroll, body: SmallVec::new() });
        LoopId(self.loops.len() as u32 - 1)
    }

    pub fn tensor(&mut self, name: impl Into<String>, buffering: BufferingPolicy) -> TensorId {
        self.tensors.push(TensorDecl { name: name.into(), buffering });
        TensorId(self.tensors.len() as u32 - 1)
    }

    pub fn stage(&mut self, tensor: TensorId, kind: StageKind, depth: usize, elems: i64, domain: Extent) -> StageId {
        self.stages.push(Stage { tensor, kind, depth, elems, domain, idempotent: true, side_effecting: false });
        StageId(self.stages.len() as u32 - 1)
    }

    /// Override the replayability flags of a stage.
    pub fn set_flags(&mut self, stage: StageId, idempotent: bool, side_effecting: bool) {
        let s = &mut self.stages[stage.0 as usize];
        s.idempotent = idempotent;
        s.side_effecting = side_effecting;
    }

    pub fn finish(self) -> Result<LoopNestModel> {
        let Self { mut loops, stages, tensors } = self;

        let mut producers: HashMap<TensorId, StageId> = HashMap::new();
        for (i, stage) in stages.iter().enumerate() {
            let id = StageId(i as u32);
            snafu::ensure!(stage.depth <= loops.len(), DepthOutOfRangeSnafu {
                tensor: tensors[stage.tensor.0 as usize].name.clone(),
                depth: stage.depth,
                nesting: loops.len(),
            });
            if producers.insert(stage.tensor, id).is_some() {
                return MultipleProducersSnafu { tensor: tensors[stage.tensor.0 as usize].name.clone() }.fail();
            }
        }

        for stage in &stages {
            let Some(src) = stage.kind.src_tensor() else { continue };
            let producer = producers
                .get(&src)
                .copied()
                .context(MissingProducerSnafu { tensor: tensors[src.0 as usize].name.clone() })?;
            let src_elems = stages[producer.0 as usize].elems;
            snafu::ensure!(src_elems == stage.elems, ElemCountMismatchSnafu {
                tensor: tensors[stage.tensor.0 as usize].name.clone(),
                elems: stage.elems,
                src: tensors[src.0 as usize].name.clone(),
                src_elems,
            });
        }

        // Canonical body: stages of depth d, in program order, ahead of the
        // loop nested at depth d + 1.
        let mut items_per_depth: Vec<SmallVec<[BodyItem; 4]>> = vec![SmallVec::new(); loops.len() + 1];
        for (i, stage) in stages.iter().enumerate() {
            let index = match stage.depth {
                0 => IndexExpr::constant(0),
                d => IndexExpr::at(LoopId(d as u32 - 1), 0),
            };
            let guard = canonical_guard(stage, &loops, index.clone());
            let slot = match stage.kind {
                StageKind::Store { .. } => None,
                _ => Some(SlotIndex::new(index.clone(), 1)),
            };
            let read_slot = stage.kind.src_tensor().map(|_| SlotIndex::new(index.clone(), 1));
            items_per_depth[stage.depth]
                .push(BodyItem::Step(Step { stage: StageId(i as u32), index, guard, slot, read_slot }));
        }
        for d in (1..=loops.len()).rev() {
            let mut body = std::mem::take(&mut items_per_depth[d]);
            if d < loops.len() {
                body.push(BodyItem::Loop(LoopId(d as u32)));
            }
            loops[d - 1].body = body;
        }
        let mut roots = std::mem::take(&mut items_per_depth[0]);
        if !loops.is_empty() {
            roots.push(BodyItem::Loop(LoopId(0)));
        }

        // Default storage: a single slot per buffered tensor. Declared
        // buffering depths are annotations until a pipelining pass realises
        // them as multi-slot arrays.
        let mut slots = Vec::new();
        let mut bindings = HashMap::new();
        for stage in &stages {
            if matches!(stage.kind, StageKind::Store { .. }) {
                continue;
            }
            let array = SlotId(slots.len() as u32);
            slots.push(SlotArray { tensor: stage.tensor, elems: stage.elems, depth: 1 });
            bindings.insert(stage.tensor, SlotBinding { array });
        }

        tracing::trace!(loops = loops.len(), stages = stages.len(), "canonical nest built");
        Ok(LoopNestModel { loops, stages, tensors, slots, bindings, pipelines: Vec::new(), roots, producers })
    }
}

/// Memory steps over a ragged innermost domain need an element guard even
/// before rotation; everything else is exact inside its own loops.
fn canonical_guard(stage: &Stage, loops: &[Loop], index: IndexExpr) -> Option<Predicate> {
    if matches!(stage.kind, StageKind::Map { .. }) {
        return None;
    }
    let ragged = stage.depth > 0 && loops[stage.depth - 1].extent.is_ragged();
    ragged.then(|| Predicate::Element { index, stride: stage.elems, bound: stage.domain.clone() })
}
