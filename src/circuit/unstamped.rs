//! The circuit while it is still being assembled: branch declarations,
//! element stampers, and the one-time `stamp` operation that produces a
//! [`StampedCircuit`](crate::circuit::StampedCircuit).

use crate::error::{CircuitError, Result};
use crate::linalg;

use super::stamped::StampedCircuit;
use super::types::{BranchLevel, ClassifiedIndex, IntegrationMethod, MeterSpec, NodeIndex};

/// A circuit under construction.
///
/// Element stampers accumulate coefficients into `Pa`/`Pb` and the
/// associated/independent-source seeds; none of them validate that the
/// targeted branch actually admits the element being stamped onto it (see
/// the crate-level error-handling notes).
pub struct UnstampedCircuit {
    n: usize,
    b: usize,
    m: usize,
    dt: f64,
    num_x: usize,

    bn1: Vec<NodeIndex>,
    bn2: Vec<NodeIndex>,
    meters: Vec<MeterSpec>,

    pa: Vec<f64>,
    pb: Vec<f64>,

    btm: Vec<(BranchLevel, IntegrationMethod)>,
    lut: Vec<ClassifiedIndex>,
    w1c: Vec<f64>,
    w2c: Vec<f64>,
    w1o: Vec<f64>,
    w2o: Vec<f64>,
    qa0: Vec<f64>,
    qs0: Vec<f64>,
}

impl UnstampedCircuit {
    /// Creates a new circuit with `n` non-ground nodes, `b` branches, `m`
    /// meters, and time step `dt`. Fails if `dt` is not strictly positive.
    pub fn new(n: usize, b: usize, m: usize, dt: f64) -> Result<Self> {
        if !(dt > 0.0) {
            return Err(CircuitError::invalid_time_step(dt));
        }
        Ok(Self {
            n,
            b,
            m,
            dt,
            num_x: 0,
            bn1: vec![None; b],
            bn2: vec![None; b],
            meters: vec![MeterSpec::Voltmeter { n1: None, n2: None }; m],
            pa: vec![0.0; b * b],
            pb: vec![0.0; b * b],
            btm: vec![(BranchLevel::default(), IntegrationMethod::default()); b],
            lut: vec![ClassifiedIndex::YType; b],
            w1c: vec![0.0; b],
            w2c: vec![0.0; b],
            w1o: vec![0.0; b],
            w2o: vec![0.0; b],
            qa0: vec![0.0; b],
            qs0: vec![0.0; b],
        })
    }

    /// Declares branch `br`'s endpoints, level, and integration method.
    ///
    /// Must be called once for every branch before any element stamper
    /// targeting it, and before [`stamp`](Self::stamp).
    pub fn bran(
        &mut self,
        br: usize,
        n1: NodeIndex,
        n2: NodeIndex,
        level: BranchLevel,
        method: IntegrationMethod,
    ) {
        self.bn1[br] = n1;
        self.bn2[br] = n2;
        self.btm[br] = (level, method);
        self.lut[br] = if level.is_current_branch() {
            let idx = self.num_x;
            self.num_x += 1;
            ClassifiedIndex::XType(idx)
        } else {
            ClassifiedIndex::YType
        };
        if !level.is_level_three() {
            self.pa[br * self.b + br] = 1.0;
        }
    }

    /// Declares meter `mt` as a voltmeter reading `n1 - n2`.
    pub fn met_v(&mut self, mt: usize, n1: NodeIndex, n2: NodeIndex) {
        self.meters[mt] = MeterSpec::Voltmeter { n1, n2 };
    }

    /// Declares meter `mt` as an ammeter reading the current of `branch`.
    pub fn met_a(&mut self, mt: usize, branch: usize) {
        self.meters[mt] = MeterSpec::Ammeter { branch };
    }

    fn level_of(&self, br: usize) -> BranchLevel {
        self.btm[br].0
    }

    fn method_of(&self, br: usize) -> IntegrationMethod {
        self.btm[br].1
    }

    /// Resistor on an `X`-branch: `Pb[br,br] += res`.
    pub fn add_x(&mut self, br: usize, res: f64) {
        self.pb[br * self.b + br] += res;
    }

    /// Conductance on a `Y`-branch: `Pb[br,br] += con`.
    pub fn add_y(&mut self, br: usize, con: f64) {
        self.pb[br * self.b + br] += con;
    }

    /// Ideal voltage source: `Qs0[br] += vol`.
    pub fn add_v(&mut self, br: usize, vol: f64) {
        self.qs0[br] += vol;
    }

    /// Ideal current source: `Qs0[br] += cur`.
    pub fn add_i(&mut self, br: usize, cur: f64) {
        self.qs0[br] += cur;
    }

    /// Voltage-controlled voltage source on `X`-branch `bx`, controlled by
    /// the voltage of `Y`-branch `cy`.
    pub fn add_e(&mut self, bx: usize, cy: usize, k: f64) {
        self.pb[bx * self.b + cy] += k;
    }

    /// Current-controlled voltage source on `X`-branch `bx`, controlled by
    /// the current of `X`-branch `cx`.
    pub fn add_h(&mut self, bx: usize, cx: usize, k: f64) {
        self.pb[bx * self.b + cx] += k;
    }

    /// Current-controlled current source on `Y`-branch `by`, controlled by
    /// the current of `X`-branch `cx`.
    pub fn add_f(&mut self, by: usize, cx: usize, k: f64) {
        self.pb[by * self.b + cx] += k;
    }

    /// Voltage-controlled current source on `Y`-branch `by`, controlled by
    /// the voltage of `Y`-branch `cy`.
    pub fn add_g(&mut self, by: usize, cy: usize, k: f64) {
        self.pb[by * self.b + cy] += k;
    }

    /// Series inductor on an `X`-branch with inductance `ind` and initial
    /// current `i0`.
    pub fn add_l(&mut self, br: usize, ind: f64, i0: f64) {
        let level = self.level_of(br);
        let method = self.method_of(br);
        let b = self.b;
        let dt = self.dt;
        match method {
            IntegrationMethod::Trapezoidal => {
                self.pb[br * b + br] += 2.0 * ind / dt;
                self.qa0[br] -= 2.0 * ind * i0 / dt;
                self.w2o[br] = -1.0;
                if level.is_level_three() {
                    self.pa[br * b + br] += ind;
                    self.w1o[br] = -4.0 / dt;
                } else {
                    self.w1o[br] += -4.0 * ind / dt;
                }
            }
            IntegrationMethod::BackwardEuler => {
                self.pb[br * b + br] += ind / dt;
                self.qa0[br] -= ind * i0 / dt;
                self.w2o[br] = 0.0;
                if level.is_level_three() {
                    self.pa[br * b + br] += ind;
                    self.w1o[br] = -1.0 / dt;
                } else {
                    self.w1o[br] += -ind / dt;
                }
            }
        }
    }

    /// Parallel capacitor on a `Y`-branch; dual of [`add_l`](Self::add_l).
    pub fn add_c(&mut self, br: usize, cap: f64, v0: f64) {
        // Same coefficient structure as the series inductor, dualized onto
        // the branch's voltage solution variable.
        self.add_l(br, cap, v0);
    }

    /// Series capacitor on an `X`-branch with reciprocal capacitance `rpc`
    /// (`1/C`) and initial voltage `v0`.
    pub fn add_q(&mut self, br: usize, rpc: f64, v0: f64) {
        let level = self.level_of(br);
        let method = self.method_of(br);
        let b = self.b;
        let dt = self.dt;
        let pb_coeff = match method {
            IntegrationMethod::Trapezoidal => rpc * dt / 2.0,
            IntegrationMethod::BackwardEuler => rpc * dt,
        };
        self.pb[br * b + br] += pb_coeff;
        self.qa0[br] += v0;
        self.w2o[br] = 1.0;
        if level.is_level_three() {
            self.pa[br * b + br] += rpc;
            self.w1o[br] = dt;
        } else {
            self.w1o[br] += rpc * dt;
        }
    }

    /// Parallel inductor on a `Y`-branch; dual of [`add_q`](Self::add_q).
    pub fn add_p(&mut self, br: usize, rpg: f64, i0: f64) {
        self.add_q(br, rpg, i0);
    }

    /// Differential (d/dt) current-controlled voltage source on `X3`-branch
    /// `bx`, controlled by the current of `X`-branch `cx`.
    pub fn add_m(&mut self, bx: usize, cx: usize, k: f64, ic0: f64) {
        let method = self.method_of(bx);
        let b = self.b;
        let dt = self.dt;
        self.pa[bx * b + cx] += k;
        match method {
            IntegrationMethod::Trapezoidal => {
                self.pb[bx * b + cx] += 2.0 * k / dt;
                self.qa0[bx] -= 2.0 * k * ic0 / dt;
                self.w1o[bx] = -4.0 / dt;
                self.w2o[bx] = -1.0;
            }
            IntegrationMethod::BackwardEuler => {
                self.pb[bx * b + cx] += k / dt;
                self.qa0[bx] -= k * ic0 / dt;
                self.w1o[bx] = -1.0 / dt;
                self.w2o[bx] = 0.0;
            }
        }
    }

    /// Differential (d/dt) voltage-controlled current source on `Y3`-branch
    /// `by`, controlled by the voltage of `Y`-branch `cy`; dual of
    /// [`add_m`](Self::add_m).
    pub fn add_n(&mut self, by: usize, cy: usize, k: f64, vc0: f64) {
        self.add_m(by, cy, k, vc0);
    }

    /// Integral (∫dt) current-controlled voltage source on `X3`-branch
    /// `bx`, controlled by the current of `X`-branch `cx`.
    pub fn add_a(&mut self, bx: usize, cx: usize, k: f64, v0: f64) {
        let method = self.method_of(bx);
        let b = self.b;
        let dt = self.dt;
        self.pa[bx * b + cx] += k;
        self.qa0[bx] += v0;
        self.w1o[bx] = dt;
        self.w2o[bx] = 1.0;
        self.pb[bx * b + cx] += match method {
            IntegrationMethod::Trapezoidal => k * dt / 2.0,
            IntegrationMethod::BackwardEuler => k * dt,
        };
    }

    /// Integral (∫dt) voltage-controlled current source on `Y3`-branch
    /// `by`, controlled by the voltage of `Y`-branch `cy`; dual of
    /// [`add_a`](Self::add_a).
    pub fn add_b(&mut self, by: usize, cy: usize, k: f64, i0: f64) {
        self.add_a(by, cy, k, i0);
    }

    /// Switch on an `Sw`-branch with closed/open blend parameters `k1`/`k2`
    /// and companion conductance `ysw` (with series on-resistance `ron`).
    ///
    /// `k1 = 1, k2 ≈ 0.6569, ysw ≈ 0.2929 / timestep-scaled-impedance` is a
    /// commonly used parameterization but is not enforced by this stamper.
    pub fn add_s(&mut self, br: usize, k1: f64, k2: f64, ysw: f64, ron: f64) {
        let b = self.b;
        let tau = 1.0 + ysw * ron;
        self.pb[br * b + br] += ysw / tau;
        self.w1c[br] = (k1 + 1.0) * ysw / (tau * tau);
        self.w2c[br] = (1.0 - k1 * ysw * ron) / tau;
        self.w1o[br] = (k2 - 1.0) * ysw / (tau * tau);
        self.w2o[br] = (k2 + ysw * ron) / tau;
    }

    /// Builds the augmented nodal matrix, inverts it, derives the reduced
    /// runtime operators, and consumes `self` to produce a
    /// [`StampedCircuit`]. Not reentrant: it takes `self` by value, so a
    /// second call on the same circuit is a compile error.
    pub fn stamp(self) -> StampedCircuit {
        let n = self.n;
        let b = self.b;
        let m = self.m;
        let x = self.num_x;
        let nx = n + x;

        // Step 1: stamp Pb into the augmented nodal matrix Pn.
        let mut pn = vec![0.0f64; nx * nx];
        for i in 0..b {
            let n1 = self.bn1[i];
            let n2 = self.bn2[i];
            match self.lut[i] {
                ClassifiedIndex::YType => {
                    for j in 0..b {
                        let k = self.pb[i * b + j];
                        match self.lut[j] {
                            ClassifiedIndex::YType => {
                                let nc1 = self.bn1[j];
                                let nc2 = self.bn2[j];
                                if let (Some(r), Some(c)) = (n1, nc1) {
                                    pn[r * nx + c] += k;
                                }
                                if let (Some(r), Some(c)) = (n1, nc2) {
                                    pn[r * nx + c] -= k;
                                }
                                if let (Some(r), Some(c)) = (n2, nc1) {
                                    pn[r * nx + c] -= k;
                                }
                                if let (Some(r), Some(c)) = (n2, nc2) {
                                    pn[r * nx + c] += k;
                                }
                            }
                            ClassifiedIndex::XType(aux_j) => {
                                let col = n + aux_j;
                                if let Some(r) = n1 {
                                    pn[r * nx + col] += k;
                                }
                                if let Some(r) = n2 {
                                    pn[r * nx + col] -= k;
                                }
                            }
                        }
                    }
                }
                ClassifiedIndex::XType(aux_i) => {
                    let row = n + aux_i;
                    if let Some(r) = n1 {
                        pn[r * nx + row] += 1.0;
                        pn[row * nx + r] += 1.0;
                    }
                    if let Some(r) = n2 {
                        pn[r * nx + row] -= 1.0;
                        pn[row * nx + r] -= 1.0;
                    }
                    for j in 0..b {
                        let k = self.pb[i * b + j];
                        match self.lut[j] {
                            ClassifiedIndex::YType => {
                                let nc1 = self.bn1[j];
                                let nc2 = self.bn2[j];
                                if let Some(c) = nc1 {
                                    pn[row * nx + c] -= k;
                                }
                                if let Some(c) = nc2 {
                                    pn[row * nx + c] += k;
                                }
                            }
                            ClassifiedIndex::XType(aux_j) => {
                                let col = n + aux_j;
                                pn[row * nx + col] -= k;
                            }
                        }
                    }
                }
            }
        }

        linalg::mat_inv(nx, &mut pn); // pn now holds Pn^-1

        // Ptp = Pn^-1 . Tn, computed directly (Tn's columns are one- or
        // two-sparse so this is cheaper than materializing Tn).
        let mut ptp = vec![0.0f64; nx * b];
        for i in 0..nx {
            for j in 0..b {
                match self.lut[j] {
                    ClassifiedIndex::YType => {
                        let n1 = self.bn1[j];
                        let n2 = self.bn2[j];
                        if let Some(c) = n1 {
                            ptp[i * b + j] -= pn[i * nx + c];
                        }
                        if let Some(c) = n2 {
                            ptp[i * b + j] += pn[i * nx + c];
                        }
                    }
                    ClassifiedIndex::XType(aux_j) => {
                        let col = n + aux_j;
                        ptp[i * b + j] += pn[i * nx + col];
                    }
                }
            }
        }
        drop(pn);

        // Ttp: row i is Ptp[n1] - Ptp[n2] for a Y-branch, Ptp[aux(i)] for X.
        let mut ttp = vec![0.0f64; b * b];
        for i in 0..b {
            match self.lut[i] {
                ClassifiedIndex::YType => {
                    let n1 = self.bn1[i];
                    let n2 = self.bn2[i];
                    if let Some(r) = n1 {
                        for j in 0..b {
                            ttp[i * b + j] += ptp[r * b + j];
                        }
                    }
                    if let Some(r) = n2 {
                        for j in 0..b {
                            ttp[i * b + j] -= ptp[r * b + j];
                        }
                    }
                }
                ClassifiedIndex::XType(aux_i) => {
                    let row = n + aux_i;
                    for j in 0..b {
                        ttp[i * b + j] += ptp[row * b + j];
                    }
                }
            }
        }

        let mut ctp = vec![0.0f64; b * b];
        let mut rtp = vec![0.0f64; b * b];
        linalg::mat_mul(b, &mut ctp, &self.pa, &ttp);
        linalg::mat_mul(b, &mut rtp, &self.pb, &ttp);
        for i in 0..b {
            rtp[i * b + i] += 1.0;
        }

        let mut dtp = vec![0.0f64; m * b];
        for (i, meter) in self.meters.iter().enumerate() {
            match *meter {
                MeterSpec::Ammeter { branch } => match self.lut[branch] {
                    ClassifiedIndex::YType => {
                        for j in 0..b {
                            dtp[i * b + j] += rtp[branch * b + j];
                        }
                    }
                    ClassifiedIndex::XType(aux) => {
                        let row = n + aux;
                        for j in 0..b {
                            dtp[i * b + j] += ptp[row * b + j];
                        }
                    }
                },
                MeterSpec::Voltmeter { n1, n2 } => {
                    if let Some(r) = n1 {
                        for j in 0..b {
                            dtp[i * b + j] += ptp[r * b + j];
                        }
                    }
                    if let Some(r) = n2 {
                        for j in 0..b {
                            dtp[i * b + j] -= ptp[r * b + j];
                        }
                    }
                }
            }
        }
        drop(ptp);
        drop(ttp);
        drop(rtp);

        // Branch cutting: assign compact indices to kept (non-level-0)
        // branches, drop level-0 branches.
        let mut compact = vec![None; b];
        let mut c = 0usize;
        for i in 0..b {
            let (level, _) = self.btm[i];
            if !level.is_cut() {
                compact[i] = Some(c);
                c += 1;
            }
        }

        let mut mat_d = vec![0.0f64; m * c];
        for i in 0..m {
            let mut jdx = 0;
            for j in 0..b {
                if compact[j].is_none() {
                    continue;
                }
                mat_d[i * c + jdx] = dtp[i * b + j];
                jdx += 1;
            }
        }
        let mut mat_c = vec![0.0f64; c * c];
        let mut idx = 0;
        for i in 0..b {
            if compact[i].is_none() {
                continue;
            }
            let mut jdx = 0;
            for j in 0..b {
                if compact[j].is_none() {
                    continue;
                }
                mat_c[idx * c + jdx] = ctp[i * b + j];
                jdx += 1;
            }
            idx += 1;
        }
        drop(ctp);
        drop(dtp);

        let btm = self.btm;

        let mut stamped = StampedCircuit::from_stamp(
            b,
            m,
            c,
            self.dt,
            compact,
            btm,
            self.w1c,
            self.w2c,
            self.w1o,
            self.w2o,
            self.qa0,
            self.qs0,
            mat_c,
            mat_d,
        );
        stamped.reset();
        stamped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// One X1 branch (V=-100, X=100) between node 1 and ground, voltmeter
    /// across it. After one `upd_cr` the branch voltage should equal the
    /// source voltage (Ohm's law at DC, no reactive elements involved).
    #[test]
    fn ohms_law_steady_state() {
        let mut circuit = UnstampedCircuit::new(1, 1, 1, 1e-6).unwrap();
        circuit.bran(0, Some(0), None, BranchLevel::X1, IntegrationMethod::Trapezoidal);
        circuit.add_v(0, -100.0);
        circuit.add_x(0, 100.0);
        circuit.met_v(0, Some(0), None);

        let mut stamped = circuit.stamp();
        stamped.upd_cr();
        stamped.upd_mt();

        assert_relative_eq!(stamped.get_xc(0), -1.0, epsilon = 1e-9);
        assert_relative_eq!(stamped.get_mt(0), 100.0, epsilon = 1e-9);
    }

    /// An ammeter on the same branch sees the same current the voltmeter's
    /// companion computation implies.
    #[test]
    fn ammeter_matches_branch_current() {
        let mut circuit = UnstampedCircuit::new(1, 1, 1, 1e-6).unwrap();
        circuit.bran(0, Some(0), None, BranchLevel::X1, IntegrationMethod::Trapezoidal);
        circuit.add_v(0, -50.0);
        circuit.add_x(0, 25.0);
        circuit.met_a(0, 0);

        let mut stamped = circuit.stamp();
        stamped.upd_cr();
        stamped.upd_mt();

        assert_relative_eq!(stamped.get_mt(0), stamped.get_xc(0), epsilon = 1e-12);
        assert_relative_eq!(stamped.get_xc(0), -2.0, epsilon = 1e-9);
    }

    /// Level-0 branches (no state, no independent source) are cut: reading
    /// or writing them through the retained branch index is a no-op.
    #[test]
    fn cut_branches_read_zero_and_ignore_writes() {
        // Branch 0: Y0 controller (no state) that drives an F source onto
        // an X1 branch 1, which supplies the actual current.
        let mut circuit = UnstampedCircuit::new(1, 2, 0, 1e-6).unwrap();
        circuit.bran(0, Some(0), None, BranchLevel::Y0, IntegrationMethod::Trapezoidal);
        circuit.bran(1, Some(0), None, BranchLevel::X1, IntegrationMethod::Trapezoidal);
        circuit.add_y(0, 1.0);
        circuit.add_x(1, 10.0);

        let mut stamped = circuit.stamp();
        assert_eq!(stamped.num_c(), 1);
        stamped.set_qs(0, 123.0); // no-op: branch 0 was cut
        stamped.upd_cr();
        assert_relative_eq!(stamped.get_xc(0), 0.0, epsilon = 1e-12);
    }

    /// Calling `upd_sw` repeatedly without a switch flip is a fixed point
    /// for a circuit with no switches at all (every branch has W1s=0,
    /// W2s=1 from `reset`).
    #[test]
    fn upd_sw_is_idempotent_without_switches() {
        let mut circuit = UnstampedCircuit::new(1, 1, 0, 1e-6).unwrap();
        circuit.bran(0, Some(0), None, BranchLevel::X2, IntegrationMethod::BackwardEuler);
        circuit.add_v(0, -10.0);
        circuit.add_l(0, 1e-3, 0.0);

        let mut stamped = circuit.stamp();
        stamped.upd_sw();
        let after_one = stamped.get_xc(0);
        stamped.upd_sw();
        stamped.upd_sw();
        assert_relative_eq!(stamped.get_xc(0), after_one, epsilon = 1e-12);
    }

    /// Dropping an `UnstampedCircuit` before `stamp` is an ordinary `Vec`
    /// drop; nothing else to assert beyond "it doesn't panic or leak".
    #[test]
    fn unstamped_circuit_can_be_dropped_without_stamping() {
        let circuit = UnstampedCircuit::new(2, 3, 1, 1e-6).unwrap();
        drop(circuit);
    }

    #[test]
    fn rejects_non_positive_time_step() {
        assert!(UnstampedCircuit::new(1, 1, 1, 0.0).is_err());
        assert!(UnstampedCircuit::new(1, 1, 1, -1.0).is_err());
    }

    /// Boost-converter style circuit (see the crate's end-to-end property
    /// tests for the full DC-gain sweep): a single operating point sanity
    /// check that the E/F cross-coupled sources actually reach the nodal
    /// matrix.
    #[test]
    fn controlled_sources_couple_through_stamp() {
        let vg = 100.0_f64;
        let d = 0.4_f64;
        let r = 100.0_f64;
        let rl = 0.1_f64;

        let mut circuit = UnstampedCircuit::new(1, 2, 1, 5e-6).unwrap();
        circuit.bran(0, Some(0), None, BranchLevel::X1, IntegrationMethod::Trapezoidal);
        circuit.add_v(0, -vg);
        circuit.add_x(0, rl);
        circuit.add_e(0, 1, 1.0 - d);
        circuit.bran(1, Some(0), None, BranchLevel::Y0, IntegrationMethod::Trapezoidal);
        circuit.add_f(1, 0, d - 1.0);
        circuit.add_y(1, 1.0 / r);
        circuit.met_v(0, Some(0), None);

        let mut stamped = circuit.stamp();
        stamped.upd_cr();
        stamped.upd_mt();

        let expected = vg / (1.0 - d);
        assert_relative_eq!(stamped.get_mt(0), expected, epsilon = 1e-6 * expected);
    }
}

