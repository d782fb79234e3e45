//! Bounded human-like interaction on a loaded page
//!
//! The plan is drawn up front so the random generator never lives across an
//! await point; execution is capped by [`HUMAN_SIMULATION_BUDGET_MS`].

use rand::Rng;
use std::time::Duration;
use tracing::debug;

use super::page_timeout::with_page_timeout;
use crate::driver::{DriverError, PageHandle, Viewport};
use crate::utils::HUMAN_SIMULATION_BUDGET_MS;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HumanStep {
    MouseMove { x: f64, y: f64 },
    Scroll { delta_y: i64 },
    Pause(Duration),
}

/// Random sequence of pointer moves, scrolls and pauses within the viewport
#[must_use]
pub fn plan_interactions(viewport: Viewport) -> Vec<HumanStep> {
    let mut rng = rand::rng();
    let width = f64::from(viewport.width.max(1));
    let height = f64::from(viewport.height.max(1));
    let moves = rng.random_range(2..=4);

    let mut steps = Vec::with_capacity(moves * 3 + 1);
    for _ in 0..moves {
        steps.push(HumanStep::MouseMove {
            x: rng.random_range(0.0..width),
            y: rng.random_range(0.0..height),
        });
        steps.push(HumanStep::Pause(Duration::from_millis(
            rng.random_range(50..250),
        )));
        if rng.random_bool(0.5) {
            steps.push(HumanStep::Scroll {
                delta_y: rng.random_range(120..600),
            });
        }
    }
    steps.push(HumanStep::Pause(Duration::from_millis(
        rng.random_range(100..400),
    )));
    steps
}

async fn run_steps(page: &dyn PageHandle, steps: &[HumanStep]) -> Result<(), DriverError> {
    for step in steps {
        match *step {
            HumanStep::MouseMove { x, y } => page.mouse_move(x, y).await?,
            HumanStep::Scroll { delta_y } => {
                page.evaluate(&format!("window.scrollBy(0, {delta_y})"))
                    .await?;
            }
            HumanStep::Pause(duration) => tokio::time::sleep(duration).await,
        }
    }
    Ok(())
}

/// Play a random interaction plan; failures are logged and never fail a fetch
pub async fn simulate_human_behavior(page: &dyn PageHandle, viewport: Viewport) {
    let steps = plan_interactions(viewport);
    let budget = Duration::from_millis(HUMAN_SIMULATION_BUDGET_MS);
    if let Err(e) = with_page_timeout(run_steps(page, &steps), budget, "Human simulation").await
    {
        debug!(page_id = %page.id(), "Human simulation cut short: {}", e);
    }
}
