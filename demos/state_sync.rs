//! Frame-by-frame demo of client prediction, reconciliation, interpolation and lag
//! compensation over a simulated lagged link.
//!
//! Run with:
//! ```bash
//! cargo run --example state_sync -- --latency-ms 120 --wall 4.0
//! ```

use std::collections::VecDeque;

use clap::Parser;
use fortress_sync::prelude::*;
use tracing::{debug, info, warn};
use web_time::Duration;

const PLAYER: EntityId = EntityId::new(1);
const TARGET: EntityId = EntityId::new(2);

#[derive(Parser)]
struct Opt {
    /// Number of simulation ticks to run
    #[arg(short, long, default_value_t = 180)]
    ticks: u32,
    /// One-way latency of the simulated link, in milliseconds
    #[arg(short, long, default_value_t = 100)]
    latency_ms: u64,
    /// Simulation rate in ticks per second
    #[arg(short = 'r', long, default_value_t = 60)]
    tick_rate: u32,
    /// Render frames per second, independent of the tick rate
    #[arg(short, long, default_value_t = 75.0)]
    fps: f64,
    /// Server-side wall the player cannot pass, forcing corrections
    #[arg(short, long)]
    wall: Option<f64>,
    /// Log every tick instead of a summary every second
    #[arg(short, long)]
    verbose: bool,
}

/// Messages in flight, each delivered once its tick arrives.
struct Link<T> {
    delay_ticks: u32,
    queue: VecDeque<(u32, T)>,
}

impl<T> Link<T> {
    fn new(delay_ticks: u32) -> Self {
        Self {
            delay_ticks,
            queue: VecDeque::new(),
        }
    }

    fn send(&mut self, now: u32, message: T) {
        self.queue.push_back((now + self.delay_ticks, message));
    }

    fn receive(&mut self, now: u32) -> Vec<T> {
        let mut delivered = Vec::new();
        while self.queue.front().is_some_and(|(at, _)| *at <= now) {
            if let Some((_, message)) = self.queue.pop_front() {
                delivered.push(message);
            }
        }
        delivered
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opt = Opt::parse();

    // configure logging: output Fortress Sync and demo logs to standard out
    let level = if opt.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(level)
            .finish(),
    )?;

    if !(opt.fps.is_finite() && opt.fps > 0.0) {
        return Err(format!("fps must be positive, got {}", opt.fps).into());
    }

    let builder = SyncBuilder::new().with_tick_rate(opt.tick_rate)?;
    let config = *builder.config();
    let step = config.step();
    let delay_ticks = ((opt.latency_ms as f64 / 1000.0) / step).round() as u32;
    info!(
        "tick rate {} Hz, one-way latency {} ms ({} ticks), wall {:?}",
        opt.tick_rate, opt.latency_ms, delay_ticks, opt.wall
    );

    // client side
    let seed = EntityState::seed(Vec2::zero(), Vec2::zero(), 0.0);
    let mut predictor = builder.build_predictor(PLAYER, seed)?;
    let mut reconciler = builder.build_reconciler()?;
    let mut target_view: RemoteEntityView<Vec2> = builder.build_remote_view(TARGET)?;
    let mut timestep = builder.build_timestep()?;

    // server side
    let history = builder.build_history::<Vec2>()?;
    let compensator = builder.build_lag_compensator(history.clone())?;
    let mut rtt = builder.build_rtt_estimator()?;
    let mut server_player = seed;
    let mut server_target = EntityState::seed(Vec2::new(0.0, 5.0), Vec2::new(3.0, 0.0), 0.0);
    let mut last_processed = SequenceNumber::ZERO;

    let mut uplink: Link<(InputCommand<Vec2>, f64)> = Link::new(delay_ticks);
    let mut downlink: Link<(AuthoritativeUpdate<Vec2>, EntityState<Vec2>)> =
        Link::new(delay_ticks);

    let frame_time = 1.0 / opt.fps;
    let mut tick = 0u32;
    let mut largest_error = 0.0f64;
    let mut snaps = 0u32;

    while tick < opt.ticks {
        let steps = timestep.advance(frame_time);
        for _ in 0..steps {
            if tick >= opt.ticks {
                break;
            }
            let now = f64::from(tick) * step;

            // client: steer right, then up, and fire at the target every second
            let control = if tick < opt.ticks / 2 {
                Control::Velocity(Vec2::new(2.0, 0.0))
            } else {
                Control::Velocity(Vec2::new(0.0, 2.0))
            };
            let (input, predicted) = predictor.issue(control, step)?;
            uplink.send(tick, (input, now));
            debug!("tick {}: predicted {:?}", tick, predicted.position);

            // server: process arrived inputs, record history, broadcast
            let mut processed = false;
            for (input, issued_at) in uplink.receive(tick) {
                processed = true;
                server_player = fortress_sync::kinematics::apply_command(&server_player, &input)?;
                if let Some(wall) = opt.wall {
                    if server_player.position.x > wall {
                        server_player.position.x = wall;
                    }
                }
                last_processed = input.sequence;
                rtt.add_sample_secs(2.0 * (now - issued_at).max(step));

                if input.sequence.as_u64() % u64::from(opt.tick_rate) == 0 {
                    let hit = compensator.rewind_with(TARGET, issued_at, &rtt)?;
                    info!(
                        "server: shot from input {} rewound target to t={:.3} at {:?}",
                        input.sequence, hit.timestamp, hit.position
                    );
                }
            }
            server_target = fortress_sync::kinematics::advance(
                &server_target,
                Control::Velocity(server_target.velocity),
                step,
            )?
            .with_sequence(SequenceNumber::new(u64::from(tick)));
            history.record(TARGET, server_target)?;
            if processed {
                history.record(PLAYER, server_player)?;
            }
            downlink.send(
                tick,
                (
                    AuthoritativeUpdate::new(server_player, last_processed),
                    server_target,
                ),
            );

            // client: apply authoritative updates as they arrive
            for (update, target) in downlink.receive(tick) {
                target_view.push(target)?;
                if update.last_processed_input.is_zero() {
                    continue;
                }
                match reconciler.reconcile(&mut predictor, update) {
                    Ok(result) => {
                        largest_error = largest_error.max(result.error);
                        if reconciler.policy().decide(&result) == Correction::Snap {
                            snaps += 1;
                        }
                    }
                    Err(err) if err.is_recoverable() => debug!("dropped update: {}", err),
                    Err(err) => return Err(err.into()),
                }
            }

            if tick % opt.tick_rate == 0 {
                info!(
                    "tick {:>4}: client {:?}, {} pending, target rendered at {:?}",
                    tick,
                    predictor.current_state().position,
                    predictor.pending_inputs().len(),
                    target_view.sample(now)
                );
            }
            tick += 1;
        }
    }

    if snaps > 0 {
        warn!("{} corrections exceeded the snap threshold", snaps);
    }
    info!(
        "done after {} ticks ({:?} simulated): client {:?}, server {:?}, largest correction {:.4}, rtt {:?}",
        tick,
        Duration::from_secs_f64(timestep.simulation_time()),
        predictor.current_state().position,
        server_player.position,
        largest_error,
        rtt.average_rtt()
    );
    Ok(())
}
