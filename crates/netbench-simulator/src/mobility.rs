use netbench_abstract::ScenarioParams;
use rand::Rng;
use serde::Serialize;
use std::f64::consts::PI;

/// Constant-velocity motion from a starting point; zero velocity means fixed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MobilityModel {
    pub origin: (f64, f64),
    pub velocity: (f64, f64),
}

impl MobilityModel {
    pub fn fixed(origin: (f64, f64)) -> Self {
        Self {
            origin,
            velocity: (0.0, 0.0),
        }
    }

    pub fn position_at(&self, seconds: f64) -> (f64, f64) {
        (
            self.origin.0 + self.velocity.0 * seconds,
            self.origin.1 + self.velocity.1 * seconds,
        )
    }

    pub fn speed(&self) -> f64 {
        self.velocity.0.hypot(self.velocity.1)
    }
}

/// Row-first grid slot of station `index`.
pub fn grid_position(params: &ScenarioParams, index: u32) -> (f64, f64) {
    let column = index % params.grid_width;
    let row = index / params.grid_width;
    (
        params.grid_min_x + column as f64 * params.grid_delta_x,
        params.grid_min_y + row as f64 * params.grid_delta_y,
    )
}

/// One model per station. With mobility on, every station draws its own speed
/// and heading from `rng`, in index order.
pub fn station_models<R: Rng>(
    params: &ScenarioParams,
    stations: u32,
    mobility: bool,
    rng: &mut R,
) -> Vec<MobilityModel> {
    (0..stations)
        .map(|i| {
            let origin = grid_position(params, i);
            if !mobility {
                return MobilityModel::fixed(origin);
            }
            let speed = rng.random_range(params.min_speed..=params.max_speed);
            let heading = rng.random_range(0.0..=2.0 * PI);
            MobilityModel {
                origin,
                velocity: (speed * heading.cos(), speed * heading.sin()),
            }
        })
        .collect()
}

pub fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.0 - b.0).hypot(a.1 - b.1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn grid_is_row_first() {
        let params = ScenarioParams::default();
        assert_eq!(grid_position(&params, 0), (70.0, 70.0));
        assert_eq!(grid_position(&params, 2), (80.0, 70.0));
        assert_eq!(grid_position(&params, 3), (70.0, 75.0));
        assert_eq!(grid_position(&params, 7), (75.0, 80.0));
    }

    #[test]
    fn static_stations_do_not_move() {
        let params = ScenarioParams::default();
        let mut rng = StdRng::seed_from_u64(1);
        let models = station_models(&params, 4, false, &mut rng);
        assert!(models.iter().all(|m| m.position_at(30.0) == m.origin));
    }

    #[test]
    fn mobile_speeds_stay_in_range_and_are_seeded() {
        let params = ScenarioParams::default();
        let a = station_models(&params, 16, true, &mut StdRng::seed_from_u64(9));
        let b = station_models(&params, 16, true, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
        for m in &a {
            let speed = m.speed();
            assert!((1.0 - 1e-9..=2.0 + 1e-9).contains(&speed), "speed {speed}");
        }
        let moved = a[0].position_at(10.0);
        assert!((distance(moved, a[0].origin) - a[0].speed() * 10.0).abs() < 1e-9);
    }
}
