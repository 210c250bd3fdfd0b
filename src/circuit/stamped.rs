//! The circuit once it has been stamped: the compact runtime operators `C`
//! and `D`, and the fixed-step update loop that drives them.

use crate::linalg;

use super::types::{BranchLevel, IntegrationMethod};

/// A circuit ready for the runtime update loop.
///
/// Produced exclusively by
/// [`UnstampedCircuit::stamp`](crate::circuit::UnstampedCircuit::stamp),
/// which consumes the unstamped circuit. There is no way to construct a
/// `StampedCircuit` directly, and no way to re-stamp one.
pub struct StampedCircuit {
    b: usize,
    m: usize,
    c: usize,
    #[allow(dead_code)]
    dt: f64,

    /// Compact index for each original branch, or `None` if cut.
    lut: Vec<Option<usize>>,
    /// Level and integration method for each original branch, retained for
    /// `reset` (to seed switch weights) and `set_sw` (to look up closed vs
    /// open weights by original branch index).
    btm: Vec<(BranchLevel, IntegrationMethod)>,
    w1c: Vec<f64>,
    w2c: Vec<f64>,
    w1o: Vec<f64>,
    w2o: Vec<f64>,
    qa0: Vec<f64>,
    qs0: Vec<f64>,

    mat_c: Vec<f64>,
    mat_d: Vec<f64>,

    w1m: Vec<f64>,
    w2m: Vec<f64>,
    w1s: Vec<f64>,
    w2s: Vec<f64>,
    qa: Vec<f64>,
    qs: Vec<f64>,
    qtp: Vec<f64>,
    xc: Vec<f64>,
    xm: Vec<f64>,
}

impl StampedCircuit {
    /// Assembles a `StampedCircuit` from the pieces `stamp` computed. Only
    /// called from [`UnstampedCircuit::stamp`](crate::circuit::UnstampedCircuit::stamp).
    #[allow(clippy::too_many_arguments)]
    pub(super) fn from_stamp(
        b: usize,
        m: usize,
        c: usize,
        dt: f64,
        lut: Vec<Option<usize>>,
        btm: Vec<(BranchLevel, IntegrationMethod)>,
        w1c: Vec<f64>,
        w2c: Vec<f64>,
        w1o: Vec<f64>,
        w2o: Vec<f64>,
        qa0: Vec<f64>,
        qs0: Vec<f64>,
        mat_c: Vec<f64>,
        mat_d: Vec<f64>,
    ) -> Self {
        Self {
            b,
            m,
            c,
            dt,
            lut,
            btm,
            w1c,
            w2c,
            w1o,
            w2o,
            qa0,
            qs0,
            mat_c,
            mat_d,
            w1m: vec![0.0; c],
            w2m: vec![0.0; c],
            w1s: vec![0.0; c],
            w2s: vec![0.0; c],
            qa: vec![0.0; c],
            qs: vec![0.0; c],
            qtp: vec![0.0; c],
            xc: vec![0.0; c],
            xm: vec![0.0; m],
        }
    }

    /// Number of kept (non-level-0) branches driving the runtime operators.
    pub fn num_c(&self) -> usize {
        self.c
    }

    /// Restores the initial runtime state: `W1m/W2m := W1o/W2o`,
    /// `Qa := Qa0`, `Qs := Qs0` for every kept branch, and seeds
    /// `W1s/W2s` so that `upd_sw` is a no-op fixed point on every branch
    /// except switches (which start open).
    pub fn reset(&mut self) {
        for i in 0..self.b {
            let Some(ci) = self.lut[i] else { continue };
            self.w1m[ci] = self.w1o[i];
            self.w2m[ci] = self.w2o[i];
            self.qa[ci] = self.qa0[i];
            self.qs[ci] = self.qs0[i];
            if self.btm[i].0 == BranchLevel::Sw {
                self.w1s[ci] = self.w1o[i];
                self.w2s[ci] = self.w2o[i];
            } else {
                self.w1s[ci] = 0.0;
                self.w2s[ci] = 1.0;
            }
        }
        linalg::vec_add(self.c, &mut self.qtp, &self.qa, &self.qs);
    }

    fn step(&mut self, use_switch_weights: bool) {
        linalg::vec_add(self.c, &mut self.qtp, &self.qa, &self.qs);
        linalg::vec_mul(self.c, self.c, &mut self.xc, &self.mat_c, &self.qtp);
        let Self {
            qa, w1m, w2m, w1s, w2s, xc, ..
        } = self;
        if use_switch_weights {
            linalg::vec_fma(xc.len(), qa, w1s, xc, w2s);
        } else {
            linalg::vec_fma(xc.len(), qa, w1m, xc, w2m);
        }
    }

    /// Iterates toward a new equilibrium after a switch state change,
    /// without advancing the independent source or physical time. Safe to
    /// call repeatedly; branches other than the one that just flipped are a
    /// fixed point of this iteration.
    pub fn upd_sw(&mut self) {
        self.step(true);
    }

    /// Advances the circuit by one fixed time step using the currently
    /// committed switch weights.
    pub fn upd_cr(&mut self) {
        self.step(false);
    }

    /// Recomputes meter readings from the current `Qtp`. Must be called
    /// after `upd_sw`/`upd_cr`/`reset` to see their effect.
    pub fn upd_mt(&mut self) {
        linalg::vec_mul(self.m, self.c, &mut self.xm, &self.mat_d, &self.qtp);
    }

    /// Sets the independent source of branch `br`. No-op if `br` was cut
    /// during stamping.
    pub fn set_qs(&mut self, br: usize, value: f64) {
        if let Some(ci) = self.lut[br] {
            self.qs[ci] = value;
        }
    }

    /// Commands branch `br` (must be an `Sw`-branch) open or closed. Takes
    /// effect on the next `upd_sw`/`upd_cr`.
    pub fn set_sw(&mut self, br: usize, closed: bool) {
        let (w1, w2) = if closed {
            (self.w1c[br], self.w2c[br])
        } else {
            (self.w1o[br], self.w2o[br])
        };
        if let Some(ci) = self.lut[br] {
            self.w1m[ci] = w1;
            self.w2m[ci] = w2;
            self.w1s[ci] = w1;
            self.w2s[ci] = w2;
        }
    }

    /// Branch solution (current for `X`-branches, voltage for
    /// `Y`/`Sw`-branches). Returns `0.0` for a cut branch.
    pub fn get_xc(&self, br: usize) -> f64 {
        match self.lut[br] {
            Some(ci) => self.xc[ci],
            None => 0.0,
        }
    }

    /// Meter reading for meter `mt`.
    pub fn get_mt(&self, mt: usize) -> f64 {
        self.xm[mt]
    }
}
