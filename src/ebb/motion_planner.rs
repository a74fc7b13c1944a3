/// Highest step rate the EBB will pulse a motor at.
pub const MAX_STEP_RATE_HZ: f64 = 25_000.0;

/// Each acceleration and deceleration ramp is approximated by this many constant-rate segments.
const RAMP_SLICES: usize = 4;

/// One `SM` command worth of motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveSegment {
    pub duration_ms: u32,
    pub motor1: i32,
    pub motor2: i32,
}

impl MoveSegment {
    pub fn to_command(&self) -> String {
        format!("SM,{},{},{}", self.duration_ms, self.motor1, self.motor2)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MotionLimits {
    /// Cruise speed along the path, in XY steps per second.
    pub speed: f64,
    /// In XY steps per second squared.
    pub accel: f64,
    pub const_speed: bool,
}

/// The AxiDraw carriage is mixed-axis: both motors turn together to move along X and in
/// opposition to move along Y.
pub fn mix_axes(dx: i32, dy: i32) -> (i32, i32) {
    (dx + dy, dx - dy)
}

/// Splits a straight move of `dx`,`dy` XY steps into constant-rate segments following a
/// trapezoidal speed profile (or a single segment when `const_speed` is set).  The segment steps
/// always add up to exactly the requested move.
pub fn plan_move(dx: i32, dy: i32, limits: &MotionLimits) -> Vec<MoveSegment> {
    let distance = f64::from(dx).hypot(f64::from(dy));
    if distance == 0.0 {
        return Vec::new();
    }

    // (fraction of distance covered at end of slice, slice duration in seconds)
    let mut slices: Vec<(f64, f64)> = Vec::new();
    if limits.const_speed || limits.accel <= 0.0 {
        slices.push((1.0, distance / limits.speed));
    } else {
        let mut peak = limits.speed;
        let mut ramp_distance = peak * peak / (2.0 * limits.accel);
        if 2.0 * ramp_distance > distance {
            ramp_distance = distance / 2.0;
            peak = (limits.accel * distance).sqrt();
        }
        let ramp_time = peak / limits.accel;
        let slice_time = ramp_time / RAMP_SLICES as f64;
        let ramp_covered = |t: f64| 0.5 * limits.accel * t * t;

        for i in 1..=RAMP_SLICES {
            let covered = ramp_covered(slice_time * i as f64);
            slices.push((covered / distance, slice_time));
        }
        let cruise_distance = distance - 2.0 * ramp_distance;
        if cruise_distance > 0.0 {
            slices.push(((ramp_distance + cruise_distance) / distance, cruise_distance / peak));
        }
        for i in 1..=RAMP_SLICES {
            let remaining = ramp_covered(slice_time * (RAMP_SLICES - i) as f64);
            slices.push(((distance - remaining) / distance, slice_time));
        }
    }

    let mut segments = Vec::with_capacity(slices.len());
    let (mut done_x, mut done_y) = (0, 0);
    let last = slices.len() - 1;
    for (index, (fraction, seconds)) in slices.into_iter().enumerate() {
        let (target_x, target_y) = if index == last {
            (dx, dy)
        } else {
            let fraction = fraction.min(1.0);
            (
                (f64::from(dx) * fraction).round() as i32,
                (f64::from(dy) * fraction).round() as i32,
            )
        };
        let (step_x, step_y) = (target_x - done_x, target_y - done_y);
        if step_x == 0 && step_y == 0 {
            continue;
        }
        let (motor1, motor2) = mix_axes(step_x, step_y);
        let busiest = motor1.unsigned_abs().max(motor2.unsigned_abs());
        let min_ms = (f64::from(busiest) * 1000.0 / MAX_STEP_RATE_HZ).ceil();
        let duration_ms = (seconds * 1000.0).ceil().max(min_ms).max(1.0) as u32;
        segments.push(MoveSegment { duration_ms, motor1, motor2 });
        done_x = target_x;
        done_y = target_y;
    }
    segments
}

pub fn total_duration_ms(segments: &[MoveSegment]) -> u64 {
    segments.iter().map(|s| u64::from(s.duration_ms)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMITS: MotionLimits = MotionLimits { speed: 10_000.0, accel: 40_000.0, const_speed: false };

    fn summed(segments: &[MoveSegment]) -> (i32, i32) {
        segments.iter().fold((0, 0), |(a, b), s| (a + s.motor1, b + s.motor2))
    }

    #[test]
    fn test_zero_move_is_empty() {
        assert!(plan_move(0, 0, &LIMITS).is_empty());
    }

    #[test]
    fn test_const_speed_single_segment() {
        let limits = MotionLimits { const_speed: true, ..LIMITS };
        let segments = plan_move(2032, 0, &limits);
        assert_eq!(segments, vec![MoveSegment { duration_ms: 204, motor1: 2032, motor2: 2032 }]);
        assert_eq!(segments[0].to_command(), "SM,204,2032,2032");
    }

    #[test]
    fn test_trapezoid_steps_add_up() {
        let segments = plan_move(7000, -3000, &LIMITS);
        assert_eq!(segments.len(), 2 * RAMP_SLICES + 1);
        assert_eq!(summed(&segments), mix_axes(7000, -3000));
    }

    #[test]
    fn test_short_move_is_triangular() {
        // Ramping up to 10000 steps/s takes 1250 steps, so 1000 steps never cruises.
        let segments = plan_move(0, 1000, &LIMITS);
        assert!(segments.len() <= 2 * RAMP_SLICES);
        assert_eq!(summed(&segments), (1000, -1000));
    }

    #[test]
    fn test_respects_step_rate_limit() {
        let limits = MotionLimits { speed: 1.0e9, accel: 1.0e12, const_speed: true };
        let segments = plan_move(25_000, 25_000, &limits);
        assert_eq!(segments.len(), 1);
        // 50000 motor1 steps at 25kHz
        assert_eq!(segments[0].duration_ms, 2000);
    }

    #[test]
    fn test_total_duration() {
        let segments = plan_move(5000, 5000, &LIMITS);
        let total = total_duration_ms(&segments);
        assert!(total >= segments.len() as u64);
        assert_eq!(total, segments.iter().map(|s| s.duration_ms as u64).sum::<u64>());
    }
}
