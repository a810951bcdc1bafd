//! Bytecode writer: turns [`Opcode`](crate::opcode::Opcode) plus operands
//! into the `u32` stream `wam_core::Clause::code` stores (spec §4.1 "Code
//! generation emits a flat u32 stream").
//!
//! One opcode occupies one `u32`; each operand follows as one or more `u32`
//! words, wide values (`i64`, `f64`, bignum limbs, string bytes) split into
//! their constituent words inline rather than indexing an out-of-band pool,
//! so the whole clause stays the single flat stream `wam_core::Clause::code`
//! stores.

use crate::opcode::Opcode;
use wam_core::{AtomId, FunctorId};

#[derive(Debug, Default)]
pub struct Emitter {
    code: Vec<u32>,
    /// Label id -> patch sites still waiting for a resolved address.
    pending: Vec<(Label, usize)>,
    labels: Vec<Option<u32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(pub usize);

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn here(&self) -> u32 {
        self.code.len() as u32
    }

    pub fn op(&mut self, op: Opcode) -> &mut Self {
        self.code.push(op as u32);
        self
    }

    pub fn operand_u32(&mut self, v: u32) -> &mut Self {
        self.code.push(v);
        self
    }

    pub fn operand_atom(&mut self, a: AtomId) -> &mut Self {
        self.operand_u32(a.0)
    }

    pub fn operand_functor(&mut self, f: FunctorId) -> &mut Self {
        self.operand_u32(f.0)
    }

    pub fn operand_var_slot(&mut self, slot: u32) -> &mut Self {
        self.operand_u32(slot)
    }

    /// A machine integer, inline as two words (low, high) regardless of
    /// magnitude; `H_INTEGER`/`B_INTEGER` vs. `H_INT64`/`B_INT64` is the
    /// opcode the caller already chose based on whether it fits `i32`.
    pub fn operand_i64(&mut self, v: i64) -> &mut Self {
        let bits = v as u64;
        self.operand_u32(bits as u32).operand_u32((bits >> 32) as u32)
    }

    pub fn operand_f64(&mut self, v: f64) -> &mut Self {
        self.operand_i64(v.to_bits() as i64)
    }

    /// Bignum limbs, length-prefixed.
    pub fn operand_mpz(&mut self, limbs: &[u64]) -> &mut Self {
        self.operand_u32(limbs.len() as u32);
        for limb in limbs {
            self.operand_i64(*limb as i64);
        }
        self
    }

    /// A string constant, length-prefixed and UTF-8-packed four bytes per
    /// word (zero-padded).
    pub fn operand_str(&mut self, s: &str) -> &mut Self {
        let bytes = s.as_bytes();
        self.operand_u32(bytes.len() as u32);
        for chunk in bytes.chunks(4) {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            self.operand_u32(u32::from_le_bytes(word));
        }
        self
    }

    pub fn new_label(&mut self) -> Label {
        let id = self.labels.len();
        self.labels.push(None);
        Label(id)
    }

    /// Emit a placeholder address operand for `label`, to be patched once
    /// `resolve_label` fixes its address.
    pub fn operand_label(&mut self, label: Label) -> &mut Self {
        let site = self.code.len();
        self.pending.push((label, site));
        self.operand_u32(u32::MAX)
    }

    pub fn resolve_label(&mut self, label: Label) {
        self.labels[label.0] = Some(self.here());
    }

    /// Patch every placeholder for every resolved label. Call once, after
    /// the full clause body has been emitted.
    pub fn finish(mut self) -> Vec<u32> {
        for (label, site) in std::mem::take(&mut self.pending) {
            let addr = self.labels[label.0].expect("label used but never resolved");
            self.code[site] = addr;
        }
        self.code
    }
}
