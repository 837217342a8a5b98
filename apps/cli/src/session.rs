use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::select;
use engine::{
    DistanceAccumulator, EngineConfig, PositionFilter, RaceEngine, RaceEvent, RaceState,
    ResultSink,
};
use parking_lot::Mutex;
use race_ingest_core::{
    fix_channel, PositionFix, PositionSource, RegionEvent, RegionEventRx, RegionMonitor,
};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Drives one race session: spawns the position source, pumps fixes and
/// region events into the engine one at a time in arrival order, and
/// reacts to the engine's events. The returned pump thread exits once the
/// source runs dry.
#[allow(clippy::too_many_arguments)]
pub fn spawn<S>(
    engine: Arc<Mutex<RaceEngine>>,
    monitor: Arc<dyn RegionMonitor>,
    source: S,
    region_rx: RegionEventRx,
    config: &EngineConfig,
    sink: Arc<dyn ResultSink>,
    time_scale: f64,
    auto_start: bool,
) -> JoinHandle<()>
where
    S: PositionSource + 'static,
{
    let (fix_tx, fix_rx) = fix_channel();
    tokio::spawn(async move {
        if let Err(error) = source.run(fix_tx).await {
            error!(%error, "position source failed");
        }
    });
    spawn_ticker(engine.clone(), config.tick_interval_ms, time_scale);

    let route_id = engine.lock().route().id;
    let mut pump = Pump {
        engine,
        monitor,
        filter: PositionFilter::from_config(config),
        accumulator: DistanceAccumulator::new(config.min_delta_m, config.max_delta_m),
        sink,
        route_id,
        auto_start,
    };

    std::thread::spawn(move || {
        loop {
            select! {
                recv(fix_rx) -> msg => match msg {
                    Ok(fix) => pump.on_fix(&fix),
                    Err(_) => break,
                },
                recv(region_rx) -> msg => match msg {
                    Ok(event) => pump.on_region_event(&event),
                    Err(_) => break,
                },
            }
        }
        // replay over: deliver transitions still queued, then release
        // any armed zones and stop time accrual
        while let Ok(event) = region_rx.try_recv() {
            pump.on_region_event(&event);
        }
        pump.engine.lock().cleanup();
        debug!("session pump finished");
    })
}

struct Pump {
    engine: Arc<Mutex<RaceEngine>>,
    monitor: Arc<dyn RegionMonitor>,
    filter: PositionFilter,
    accumulator: DistanceAccumulator,
    sink: Arc<dyn ResultSink>,
    route_id: Uuid,
    auto_start: bool,
}

impl Pump {
    fn on_fix(&mut self, fix: &PositionFix) {
        self.monitor.observe(fix.latitude, fix.longitude);
        let accepted = self.filter.accept(fix);

        let events = {
            let mut eng = self.engine.lock();
            // tracking stops with the race; late fixes must not disturb
            // the captured totals
            if eng.state() != RaceState::Completed {
                if let Some(accepted) = accepted {
                    self.accumulator.update(&accepted);
                    eng.on_distance(self.accumulator.cumulative_m(), accepted.speed_mps);
                }
            }
            try_start(&mut eng, self.auto_start);
            drain(&mut eng)
        };
        self.handle_events(events);
    }

    fn on_region_event(&mut self, event: &RegionEvent) {
        let events = {
            let mut eng = self.engine.lock();
            eng.on_region_event(event);
            try_start(&mut eng, self.auto_start);
            drain(&mut eng)
        };
        self.handle_events(events);
    }

    fn handle_events(&mut self, events: Vec<RaceEvent>) {
        for event in events {
            match event {
                RaceEvent::Started => {
                    self.filter.reset();
                    self.accumulator.reset();
                    info!("race started, tracking reset");
                }
                RaceEvent::SegmentCompleted { index, duration_s } => {
                    info!(segment = index + 1, duration_s, "split recorded");
                }
                RaceEvent::RaceCompleted(result) => {
                    if let Err(error) = self.sink.record(self.route_id, &result) {
                        error!(%error, "failed to record race result");
                    }
                }
            }
        }
    }
}

fn try_start(eng: &mut RaceEngine, auto_start: bool) {
    if auto_start && eng.state() == RaceState::NotStarted && eng.start().is_ok() {
        info!("start zone reached, race is on");
    }
}

fn drain(eng: &mut RaceEngine) -> Vec<RaceEvent> {
    let mut events = Vec::new();
    while let Some(event) = eng.poll_event() {
        events.push(event);
    }
    events
}

// Elapsed time follows the replay clock when the log is replayed faster
// than real time, hence the time_scale factor on the tick delta.
fn spawn_ticker(engine: Arc<Mutex<RaceEngine>>, tick_interval_ms: u64, time_scale: f64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(tick_interval_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last = Instant::now();
        loop {
            interval.tick().await;
            let now = Instant::now();
            let dt_s = now.duration_since(last).as_secs_f64() * time_scale;
            last = now;
            engine.lock().on_tick(dt_s);
        }
    });
}
