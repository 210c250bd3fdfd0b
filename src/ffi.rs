//! C-callable ABI.
//!
//! This is the external interface described in the crate's external-
//! interfaces documentation: every function here is `extern "C"`, operates
//! on an opaque handle, and uses the 1-based branch/meter/node convention
//! (node `0` is ground) that callers outside Rust expect. The safe
//! [`crate::circuit`] API underneath uses 0-based `usize`/`Option<usize>`
//! instead. This module is solely the translation layer, mirroring how a
//! JS-facing binding sits on top of a plain Rust API elsewhere in this
//! crate's ecosystem.
//!
//! Every function except [`ohmic_create`] and [`ohmic_delete`] assumes a
//! non-null handle staged in the correct lifecycle phase for the call;
//! violating that is undefined behavior, per the crate's trust-caller error
//! model.

use std::os::raw::c_int;

use crate::circuit::{BranchLevel, IntegrationMethod, StampedCircuit, UnstampedCircuit};

enum CircuitPhase {
    Unstamped(UnstampedCircuit),
    Stamped(StampedCircuit),
}

/// Opaque handle to a circuit in either lifecycle phase.
pub struct OhmicCircuit(CircuitPhase);

fn node_index(n: i32) -> Option<usize> {
    if n == 0 {
        None
    } else {
        Some((n - 1) as usize)
    }
}

fn zero_based(i: i32) -> usize {
    (i - 1) as usize
}

/// Decodes the branch-type argument of [`ohmic_bran`]: the absolute value
/// selects the level (`1..=9` for `X0..X3, Y0..Y3, Sw`), and a negative sign
/// selects backward Euler for that branch's stateful element(s) instead of
/// trapezoidal. Returns `None` for a code outside `1..=9` in absolute value;
/// callers treat that as a no-op rather than aborting the process.
fn decode_level(code: c_int) -> Option<(BranchLevel, IntegrationMethod)> {
    let method = if code < 0 {
        IntegrationMethod::BackwardEuler
    } else {
        IntegrationMethod::Trapezoidal
    };
    let level = match code.abs() {
        1 => BranchLevel::X0,
        2 => BranchLevel::X1,
        3 => BranchLevel::X2,
        4 => BranchLevel::X3,
        5 => BranchLevel::Y0,
        6 => BranchLevel::Y1,
        7 => BranchLevel::Y2,
        8 => BranchLevel::Y3,
        9 => BranchLevel::Sw,
        _ => return None,
    };
    Some((level, method))
}

/// Borrows the handle's circuit if it is in the Unstamped phase, `None`
/// otherwise. A phase mismatch is caller error per the trust-caller model;
/// returning `None` lets every call site no-op instead of aborting the
/// process.
unsafe fn unstamped_mut<'a>(handle: *mut OhmicCircuit) -> Option<&'a mut UnstampedCircuit> {
    match &mut (*handle).0 {
        CircuitPhase::Unstamped(c) => Some(c),
        CircuitPhase::Stamped(_) => None,
    }
}

unsafe fn stamped_mut<'a>(handle: *mut OhmicCircuit) -> Option<&'a mut StampedCircuit> {
    match &mut (*handle).0 {
        CircuitPhase::Stamped(c) => Some(c),
        CircuitPhase::Unstamped(_) => None,
    }
}

unsafe fn stamped_ref<'a>(handle: *const OhmicCircuit) -> Option<&'a StampedCircuit> {
    match &(*handle).0 {
        CircuitPhase::Stamped(c) => Some(c),
        CircuitPhase::Unstamped(_) => None,
    }
}

/// Creates a circuit with `n` non-ground nodes, `b` branches, `m` meters,
/// and time step `dt`. Returns null if `dt` is not strictly positive.
#[no_mangle]
pub extern "C" fn ohmic_create(n: i32, b: i32, m: i32, dt: f64) -> *mut OhmicCircuit {
    match UnstampedCircuit::new(n as usize, b as usize, m as usize, dt) {
        Ok(circuit) => Box::into_raw(Box::new(OhmicCircuit(CircuitPhase::Unstamped(circuit)))),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Destroys a circuit. A no-op on a null handle.
///
/// # Safety
/// `handle` must be either null or a pointer previously returned by
/// [`ohmic_create`] and not yet passed to `ohmic_delete`.
#[no_mangle]
pub unsafe extern "C" fn ohmic_delete(handle: *mut OhmicCircuit) {
    if handle.is_null() {
        return;
    }
    drop(Box::from_raw(handle));
}

/// Declares branch `br` (1-based) between nodes `n1`/`n2` (1-based, `0` =
/// ground) with the given branch-type code (see [`decode_level`]).
///
/// # Safety
/// `handle` must be a non-null, Unstamped handle.
#[no_mangle]
pub unsafe extern "C" fn ohmic_bran(
    handle: *mut OhmicCircuit,
    br: i32,
    n1: i32,
    n2: i32,
    branch_type: c_int,
) {
    let Some((level, method)) = decode_level(branch_type) else {
        return;
    };
    if let Some(c) = unstamped_mut(handle) {
        c.bran(zero_based(br), node_index(n1), node_index(n2), level, method);
    }
}

/// Declares meter `mt` (1-based) as a voltmeter reading `n1 - n2`.
///
/// # Safety
/// `handle` must be a non-null, Unstamped handle.
#[no_mangle]
pub unsafe extern "C" fn ohmic_met_v(handle: *mut OhmicCircuit, mt: i32, n1: i32, n2: i32) {
    if let Some(c) = unstamped_mut(handle) {
        c.met_v(zero_based(mt), node_index(n1), node_index(n2));
    }
}

/// Declares meter `mt` (1-based) as an ammeter reading the current of
/// `branch` (1-based).
///
/// # Safety
/// `handle` must be a non-null, Unstamped handle.
#[no_mangle]
pub unsafe extern "C" fn ohmic_met_a(handle: *mut OhmicCircuit, mt: i32, branch: i32) {
    if let Some(c) = unstamped_mut(handle) {
        c.met_a(zero_based(mt), zero_based(branch));
    }
}

macro_rules! stamper_1 {
    ($name:ident, $inner:ident) => {
        /// # Safety
        /// `handle` must be a non-null, Unstamped handle.
        #[no_mangle]
        pub unsafe extern "C" fn $name(handle: *mut OhmicCircuit, br: i32, value: f64) {
            if let Some(c) = unstamped_mut(handle) {
                c.$inner(zero_based(br), value);
            }
        }
    };
}

stamper_1!(ohmic_add_x, add_x);
stamper_1!(ohmic_add_y, add_y);
stamper_1!(ohmic_add_v, add_v);
stamper_1!(ohmic_add_i, add_i);

macro_rules! stamper_2 {
    ($name:ident, $inner:ident) => {
        /// # Safety
        /// `handle` must be a non-null, Unstamped handle.
        #[no_mangle]
        pub unsafe extern "C" fn $name(handle: *mut OhmicCircuit, b: i32, c: i32, k: f64) {
            if let Some(circuit) = unstamped_mut(handle) {
                circuit.$inner(zero_based(b), zero_based(c), k);
            }
        }
    };
}

stamper_2!(ohmic_add_e, add_e);
stamper_2!(ohmic_add_h, add_h);
stamper_2!(ohmic_add_f, add_f);
stamper_2!(ohmic_add_g, add_g);

macro_rules! stamper_reactive {
    ($name:ident, $inner:ident) => {
        /// # Safety
        /// `handle` must be a non-null, Unstamped handle.
        #[no_mangle]
        pub unsafe extern "C" fn $name(handle: *mut OhmicCircuit, br: i32, value: f64, initial: f64) {
            if let Some(c) = unstamped_mut(handle) {
                c.$inner(zero_based(br), value, initial);
            }
        }
    };
}

stamper_reactive!(ohmic_add_l, add_l);
stamper_reactive!(ohmic_add_c, add_c);
stamper_reactive!(ohmic_add_q, add_q);
stamper_reactive!(ohmic_add_p, add_p);

macro_rules! stamper_controlled_history {
    ($name:ident, $inner:ident) => {
        /// # Safety
        /// `handle` must be a non-null, Unstamped handle.
        #[no_mangle]
        pub unsafe extern "C" fn $name(
            handle: *mut OhmicCircuit,
            b: i32,
            c: i32,
            k: f64,
            initial: f64,
        ) {
            if let Some(circuit) = unstamped_mut(handle) {
                circuit.$inner(zero_based(b), zero_based(c), k, initial);
            }
        }
    };
}

stamper_controlled_history!(ohmic_add_m, add_m);
stamper_controlled_history!(ohmic_add_n, add_n);
stamper_controlled_history!(ohmic_add_a, add_a);
stamper_controlled_history!(ohmic_add_b, add_b);

/// Adds a switch on `Sw`-branch `br` with closed/open blend parameters
/// `k1`/`k2`, companion conductance `ysw`, and series on-resistance `ron`.
///
/// # Safety
/// `handle` must be a non-null, Unstamped handle.
#[no_mangle]
pub unsafe extern "C" fn ohmic_add_s(
    handle: *mut OhmicCircuit,
    br: i32,
    k1: f64,
    k2: f64,
    ysw: f64,
    ron: f64,
) {
    if let Some(c) = unstamped_mut(handle) {
        c.add_s(zero_based(br), k1, k2, ysw, ron);
    }
}

/// Stamps the circuit, transitioning it from Unstamped to Stamped in place.
///
/// # Safety
/// `handle` must be a non-null, Unstamped handle. Calling this twice on the
/// same handle is undefined behavior; per the crate's trust-caller model the
/// second call is a documented no-op rather than a panic.
#[no_mangle]
pub unsafe extern "C" fn ohmic_stamp(handle: *mut OhmicCircuit) {
    let phase = &mut (*handle).0;
    if matches!(phase, CircuitPhase::Stamped(_)) {
        return;
    }
    let old = std::mem::replace(phase, CircuitPhase::Stamped(placeholder_stamped()));
    if let CircuitPhase::Unstamped(circuit) = old {
        *phase = CircuitPhase::Stamped(circuit.stamp());
    }
}

/// Produces a zero-sized placeholder so `mem::replace` has somewhere to put
/// the old value during the Unstamped-to-Stamped swap above; immediately
/// overwritten and never observed.
fn placeholder_stamped() -> StampedCircuit {
    // Any valid StampedCircuit works as scratch since it is replaced before
    // `ohmic_stamp` returns; a 0-node/0-branch/0-meter circuit is the
    // cheapest one to build.
    UnstampedCircuit::new(0, 0, 0, 1.0)
        .expect("dt=1.0 is valid")
        .stamp()
}

/// Resets the runtime state to the values computed at stamp time.
///
/// # Safety
/// `handle` must be a non-null, Stamped handle.
#[no_mangle]
pub unsafe extern "C" fn ohmic_reset(handle: *mut OhmicCircuit) {
    if let Some(c) = stamped_mut(handle) {
        c.reset();
    }
}

/// # Safety
/// `handle` must be a non-null, Stamped handle.
#[no_mangle]
pub unsafe extern "C" fn ohmic_upd_sw(handle: *mut OhmicCircuit) {
    if let Some(c) = stamped_mut(handle) {
        c.upd_sw();
    }
}

/// # Safety
/// `handle` must be a non-null, Stamped handle.
#[no_mangle]
pub unsafe extern "C" fn ohmic_upd_cr(handle: *mut OhmicCircuit) {
    if let Some(c) = stamped_mut(handle) {
        c.upd_cr();
    }
}

/// # Safety
/// `handle` must be a non-null, Stamped handle.
#[no_mangle]
pub unsafe extern "C" fn ohmic_upd_mt(handle: *mut OhmicCircuit) {
    if let Some(c) = stamped_mut(handle) {
        c.upd_mt();
    }
}

/// Sets the independent source of branch `br` (1-based). No-op if `br` was
/// cut during stamping.
///
/// # Safety
/// `handle` must be a non-null, Stamped handle.
#[no_mangle]
pub unsafe extern "C" fn ohmic_set_qs(handle: *mut OhmicCircuit, br: i32, value: f64) {
    if let Some(c) = stamped_mut(handle) {
        c.set_qs(zero_based(br), value);
    }
}

/// Commands branch `br` (1-based) open (`closed == 0`) or closed
/// (`closed != 0`). Takes effect on the next `ohmic_upd_sw`/`ohmic_upd_cr`.
///
/// # Safety
/// `handle` must be a non-null, Stamped handle.
#[no_mangle]
pub unsafe extern "C" fn ohmic_set_sw(handle: *mut OhmicCircuit, br: i32, closed: c_int) {
    if let Some(c) = stamped_mut(handle) {
        c.set_sw(zero_based(br), closed != 0);
    }
}

/// Branch solution for branch `br` (1-based): current for `X`-branches,
/// voltage for `Y`/`Sw`-branches. `0.0` if `br` was cut during stamping, or
/// if the handle isn't yet Stamped.
///
/// # Safety
/// `handle` must be a non-null, Stamped handle.
#[no_mangle]
pub unsafe extern "C" fn ohmic_get_xc(handle: *const OhmicCircuit, br: i32) -> f64 {
    stamped_ref(handle).map_or(0.0, |c| c.get_xc(zero_based(br)))
}

/// Meter reading for meter `mt` (1-based). `0.0` if the handle isn't yet
/// Stamped.
///
/// # Safety
/// `handle` must be a non-null, Stamped handle.
#[no_mangle]
pub unsafe extern "C" fn ohmic_get_mt(handle: *const OhmicCircuit, mt: i32) -> f64 {
    stamped_ref(handle).map_or(0.0, |c| c.get_mt(zero_based(mt)))
}
