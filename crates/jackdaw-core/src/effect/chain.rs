//! Ordered effect chain for one track
//!
//! Effects run in insertion order. Each one carries a DSP-owned `active`
//! endpoint; inactive effects are skipped but keep their state. Effects that
//! do not need to run on silence are skipped when the chain's input amplitude
//! is below [`SILENCE_EPSILON`]; the gate looks at the chain input, not at
//! what the previous effect returned.
//!
//! Effects are held in [`basedrop::Owned`] so that removing one on the DSP
//! thread defers the deallocation to the collector thread. The backing vector
//! is reserved for [`MAX_EFFECTS_PER_CHAIN`] up front.

use std::collections::HashSet;

use basedrop::Owned;

use super::{
    dsp_param, Effect, EffectContext, EffectError, EffectKind, EffectResult, EffectUnit, MAX_EFFECTS_PER_CHAIN,
};
use crate::endpoint::{Endpoint, RouteTable, ThreadId};
use crate::engine::gc::gc_handle;
use crate::types::{StereoBuffer, SILENCE_EPSILON};

/// One named effect slot
pub struct ChainEffect {
    name: String,
    active: Endpoint,
    unit: EffectUnit,
}

impl ChainEffect {
    /// Build an effect of `kind` with default parameters
    pub fn new(kind: EffectKind, name: impl Into<String>, ctx: &EffectContext) -> EffectResult<Self> {
        Ok(Self {
            name: name.into(),
            active: dsp_param("active", "Active", true, false, true),
            unit: EffectUnit::new(kind, ctx)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EffectKind {
        self.unit.kind()
    }

    /// The `active` toggle
    pub fn active(&self) -> &Endpoint {
        &self.active
    }

    pub fn is_active(&self) -> bool {
        self.active.read(ThreadId::Dsp).as_bool()
    }

    pub fn unit(&self) -> &EffectUnit {
        &self.unit
    }

    pub fn unit_mut(&mut self) -> &mut EffectUnit {
        &mut self.unit
    }

    /// `active` followed by the effect's own endpoints
    pub fn endpoints(&self) -> Vec<Endpoint> {
        let mut eps = vec![self.active.clone()];
        eps.extend(self.unit.endpoints());
        eps
    }
}

/// A track's effects, in processing order
pub struct EffectChain {
    ctx: EffectContext,
    blocked: HashSet<EffectKind>,
    effects: Vec<Owned<ChainEffect>>,
    /// Staging for buffers longer than one chunk
    scratch: StereoBuffer,
}

impl EffectChain {
    pub fn new(ctx: EffectContext) -> Self {
        Self {
            ctx,
            blocked: HashSet::new(),
            effects: Vec::with_capacity(MAX_EFFECTS_PER_CHAIN),
            scratch: StereoBuffer::silence(ctx.chunk_len),
        }
    }

    /// Chain that refuses the given kinds
    pub fn with_blocked(ctx: EffectContext, blocked: impl IntoIterator<Item = EffectKind>) -> Self {
        let mut chain = Self::new(ctx);
        chain.blocked.extend(blocked);
        chain
    }

    pub fn context(&self) -> &EffectContext {
        &self.ctx
    }

    pub fn is_blocked(&self, kind: EffectKind) -> bool {
        self.blocked.contains(&kind)
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn effects(&self) -> impl Iterator<Item = &ChainEffect> {
        self.effects.iter().map(|e| &**e)
    }

    pub fn get(&self, index: usize) -> Option<&ChainEffect> {
        self.effects.get(index).map(|e| &**e)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ChainEffect> {
        self.effects.get_mut(index).map(|e| &mut **e)
    }

    /// Display name for the next effect of `kind`: the kind name, suffixed
    /// with a count once one already exists ("Delay", "Delay 2", ...)
    pub fn next_name(&self, kind: EffectKind) -> String {
        let existing = self.effects.iter().filter(|e| e.kind() == kind).count();
        if existing == 0 {
            kind.name().to_string()
        } else {
            format!("{} {}", kind.name(), existing + 1)
        }
    }

    /// Build and append an effect of `kind`; returns its index
    ///
    /// Allocates, so call it before the chain is handed to the DSP thread or
    /// build the effect elsewhere and send it over with [`EffectChain::push`].
    pub fn add(&mut self, kind: EffectKind) -> EffectResult<usize> {
        self.check_insert(kind)?;
        let name = self.next_name(kind);
        let effect = ChainEffect::new(kind, name, &self.ctx)?;
        self.push(Owned::new(&gc_handle(), effect))
    }

    /// Append an already built effect; returns its index
    pub fn push(&mut self, effect: Owned<ChainEffect>) -> EffectResult<usize> {
        self.check_insert(effect.kind())?;
        self.effects.push(effect);
        Ok(self.effects.len() - 1)
    }

    fn check_insert(&self, kind: EffectKind) -> EffectResult<()> {
        if self.is_blocked(kind) {
            log::warn!("{} effects are blocked on this chain", kind.name());
            return Err(EffectError::KindBlocked(kind));
        }
        if self.effects.len() >= MAX_EFFECTS_PER_CHAIN {
            return Err(EffectError::ChainFull(MAX_EFFECTS_PER_CHAIN));
        }
        Ok(())
    }

    /// Remove the effect at `index`
    ///
    /// Dropping the returned handle on the DSP thread is safe; the memory is
    /// released by the collector.
    pub fn remove(&mut self, index: usize) -> EffectResult<Owned<ChainEffect>> {
        if index >= self.effects.len() {
            return Err(EffectError::IndexOutOfBounds {
                index,
                len: self.effects.len(),
            });
        }
        Ok(self.effects.remove(index))
    }

    /// Exchange the positions of two effects
    pub fn swap(&mut self, a: usize, b: usize) -> EffectResult<()> {
        let len = self.effects.len();
        for index in [a, b] {
            if index >= len {
                return Err(EffectError::IndexOutOfBounds { index, len });
            }
        }
        self.effects.swap(a, b);
        Ok(())
    }

    /// Run the chain over `buffer` in place
    ///
    /// `input_amp` is the summed absolute amplitude of `buffer`; the return
    /// value is the same measure after the last effect. Buffers longer than
    /// the chunk length are processed in chunk-sized pieces.
    pub fn buf_apply(&mut self, buffer: &mut StereoBuffer, input_amp: f32) -> f32 {
        let chunk_len = self.ctx.chunk_len.max(1);
        if buffer.len() <= chunk_len {
            return apply_chunk(&mut self.effects, buffer, input_amp);
        }

        let mut output_amp = 0.0;
        let mut start = 0;
        while start < buffer.len() {
            let end = (start + chunk_len).min(buffer.len());
            self.scratch.resize(end - start);
            self.scratch
                .as_mut_slice()
                .copy_from_slice(&buffer.as_slice()[start..end]);
            let amp = self.scratch.amplitude();
            output_amp += apply_chunk(&mut self.effects, &mut self.scratch, amp);
            buffer.as_mut_slice()[start..end].copy_from_slice(self.scratch.as_slice());
            start = end;
        }
        output_amp
    }

    /// Drop every effect's signal state
    pub fn silence(&mut self) {
        for fx in &mut self.effects {
            fx.unit.silence();
        }
    }

    /// Register every effect's endpoints under `parent` + effect name
    ///
    /// Returns the number of routes registered.
    pub fn register_routes<S: AsRef<str>>(&self, table: &mut RouteTable, parent: &[S]) -> usize {
        let mut count = 0;
        for fx in &self.effects {
            let mut components: Vec<&str> = parent.iter().map(|s| s.as_ref()).collect();
            components.push(fx.name());
            for ep in fx.endpoints() {
                table.register(&components, &ep);
                count += 1;
            }
        }
        count
    }
}

fn apply_chunk(effects: &mut [Owned<ChainEffect>], buffer: &mut StereoBuffer, input_amp: f32) -> f32 {
    let mut output_amp = input_amp;
    for fx in effects.iter_mut() {
        fx.unit.sync_params();
        if !fx.is_active() {
            continue;
        }
        if fx.kind().operate_on_empty_buf() || input_amp > SILENCE_EPSILON {
            output_amp = fx.unit.process(buffer, input_amp);
        }
    }
    output_amp
}
