use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use ship_sync_server::config::ServerConfig;
use ship_sync_server::game::effects::TracingEffects;
use ship_sync_server::game::input_buffer::{InputSender, MoveMessage};
use ship_sync_server::game::modules::SHIP_MODULE_COUNT;
use ship_sync_server::game::moves::MoveRecord;
use ship_sync_server::game::rules::TeamRules;
use ship_sync_server::game::spatial::{Polygon, ZoneMap};
use ship_sync_server::game::systems::damage::{DamageInfo, DamageSource};
use ship_sync_server::game::world::{ShotEvent, World};
use ship_sync_server::metrics::{self, Metrics};
use ship_sync_server::net::client::ClientReplica;
use ship_sync_server::net::ghost::ConnectionId;
use ship_sync_server::net::protocol::{decode, encode, ClientMessage, ServerMessage};
use ship_sync_server::util::vec2::Vec2;

/// Shots hit the first enemy within this distance of their path
const SHOT_RANGE: f32 = 400.0;
const SHOT_HIT_RADIUS: f32 = 30.0;
const SHOT_DAMAGE: f32 = 0.12;

const PRESETS: [&str; 4] = [
    "Turbo,Shield,Phaser,Bouncer,Triple",
    "Repair,Armor,Phaser,Burster,Triple",
    "Sensor,Cloak,Phaser,Bouncer,Spybug",
    "Turbo,Armor,Triple,Burster,Mine",
];

/// A bot at the far end of a simulated link
struct SimClient {
    id: ConnectionId,
    replica: ClientReplica,
    rng: StdRng,
    heading: f32,
    /// Encoded server messages in flight, with their arrival time
    inbox: VecDeque<(u64, Vec<u8>)>,
}

impl SimClient {
    /// Wander, turn now and then, fire in bursts
    fn next_move(&mut self, tick_ms: u32) -> MoveRecord {
        if self.rng.gen_bool(0.05) {
            self.heading += self.rng.gen_range(-1.5..1.5);
        }
        let throttle = self.rng.gen_range(0.3..=1.0);
        let mut mv = MoveRecord::new(
            self.heading.cos() * throttle,
            self.heading.sin() * throttle,
            self.heading,
            tick_ms,
        );
        mv.fire = self.rng.gen_bool(0.2);
        for slot in 0..SHIP_MODULE_COUNT {
            mv.module[slot] = self.rng.gen_bool(0.1);
        }
        mv
    }
}

fn arena_zones() -> ZoneMap {
    let mut zones = ZoneMap::default();
    zones.add_slip_zone(Polygon::rect(Vec2::new(-200.0, -200.0), Vec2::new(200.0, 200.0)), 0.4);
    zones.add_speed_zone(
        Polygon::rect(Vec2::new(600.0, -20.0), Vec2::new(640.0, 20.0)),
        Vec2::new(-1.0, 0.0),
        900.0,
    );
    zones
}

/// Stand-in for projectile simulation: a shot hits the nearest enemy along its line
fn resolve_shots(world: &mut World, shots: &[ShotEvent]) {
    for event in shots {
        let Some(shooter) = world.ship(event.shooter) else {
            continue;
        };
        let (owner, team) = (shooter.owner, shooter.team);
        let dir = event.shot.dir;

        let target = world
            .ships()
            .iter()
            .filter(|(handle, ship)| *handle != event.shooter && !ship.is_destroyed())
            .filter_map(|(handle, ship)| {
                let offset = ship.actual_pos() - event.shot.pos;
                let along = offset.dot(dir);
                if !(0.0..=SHOT_RANGE).contains(&along) {
                    return None;
                }
                let miss = (offset - dir * along).length();
                (miss <= SHOT_HIT_RADIUS).then_some((handle, along))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(handle, _)| handle);

        if let Some(target) = target {
            let source = DamageSource::Projectile {
                weapon: event.shot.weapon,
                owner,
                team,
            };
            world.apply_damage(target, &DamageInfo::point(SHOT_DAMAGE, source));
        }
    }
}

/// Decode a client message and hand its move to the simulation
fn deliver_to_server(world: &mut World, sender: &InputSender, connection: ConnectionId, bytes: &[u8]) {
    match decode::<ClientMessage>(bytes) {
        Ok(ClientMessage::Move { seq, mv }) => {
            if let Err(e) = sender.try_send(MoveMessage { connection, seq, mv }) {
                warn!(%connection, "Dropped move: {}", e);
            }
        }
        Ok(ClientMessage::ChangeLoadout { loadout }) => {
            if let Err(e) = world.request_loadout(connection, &loadout, false) {
                debug!(%connection, "Loadout rejected: {}", e);
            }
        }
        Ok(ClientMessage::Leave) => {
            world.disconnect(connection);
        }
        Ok(_) => {}
        Err(e) => warn!(%connection, "Bad client message: {}", e),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Ship Sync Server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load_or_default();
    config.validate().map_err(anyhow::Error::msg)?;
    info!(
        "Configuration loaded: {} Hz, {} clients, {} ms one-way",
        config.tick_rate, config.sim_clients, config.sim_latency_ms
    );

    let metrics = Arc::new(Metrics::new());
    let metrics_clone = metrics.clone();
    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_port).await {
            error!("Metrics server error: {}", e);
        }
    });

    let zones = arena_zones();
    let mut world = World::new(Box::new(TeamRules::default()), Arc::new(TracingEffects))
        .with_zones(zones.clone());
    for i in 0..8 {
        let angle = i as f32 * std::f32::consts::TAU / 8.0;
        world.add_spawn_point(Vec2::from_angle(angle) * 500.0);
    }
    let sender = world.input_sender();

    let mut clients: Vec<SimClient> = (0..config.sim_clients)
        .map(|i| {
            let id = world.connect(&format!("Bot{i}"), Some(PRESETS[i % PRESETS.len()]));
            let mut replica = ClientReplica::new(id, zones.clone(), Arc::new(TracingEffects))
                .with_lost_contact_after(config.lost_contact_ms);
            replica.one_way_ms = config.sim_latency_ms as u32;
            SimClient {
                id,
                replica,
                rng: StdRng::seed_from_u64(i as u64),
                heading: i as f32,
                inbox: VecDeque::new(),
            }
        })
        .collect();
    metrics
        .connections_active
        .store(world.connection_count() as u64, Ordering::Relaxed);

    // Client messages in flight: (arrival time, sender, bytes)
    let mut uplink: VecDeque<(u64, ConnectionId, Vec<u8>)> = VecDeque::new();

    let tick_ms = config.tick_ms();
    let latency = config.sim_latency_ms;
    let mut ticker = tokio::time::interval(Duration::from_millis(tick_ms as u64));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let deadline = config
        .run_seconds
        .map(|s| tokio::time::Instant::now() + Duration::from_secs(s));

    let shutdown = async {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for ctrl-c: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        }
    };
    tokio::pin!(shutdown);

    info!("Simulation started at {} Hz", config.tick_rate);
    let log_every = config.tick_rate as u64 * 5;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutting down...");
                break;
            }
            _ = ticker.tick() => {}
        }

        let now = world.now_ms();

        // Client side: read what has arrived, predict, send the move
        let mut dropped = Vec::new();
        for client in &mut clients {
            while client.inbox.front().is_some_and(|(at, _)| *at <= now) {
                let Some((_, bytes)) = client.inbox.pop_front() else {
                    break;
                };
                match decode::<ServerMessage>(&bytes) {
                    Ok(ServerMessage::Ghosts { payload, .. }) => {
                        if let Err(e) = client.replica.handle_packet(&payload, now) {
                            warn!(connection = %client.id, "Malformed ghost packet: {}", e);
                            dropped.push(client.id);
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => warn!(connection = %client.id, "Bad server message: {}", e),
                }
            }

            let mv = client.next_move(tick_ms);
            let message = client.replica.make_move(mv, now);
            client.replica.tick(tick_ms, now);
            match encode(&ClientMessage::Move { seq: message.seq, mv: message.mv }) {
                Ok(bytes) => uplink.push_back((now + latency, client.id, bytes)),
                Err(e) => warn!("Failed to encode move: {}", e),
            }
        }
        for id in dropped {
            world.disconnect(id);
            clients.retain(|c| c.id != id);
        }

        // Server side
        while uplink.front().is_some_and(|(at, _, _)| *at <= now) {
            if let Some((_, connection, bytes)) = uplink.pop_front() {
                deliver_to_server(&mut world, &sender, connection, &bytes);
            }
        }

        let started = Instant::now();
        let report = world.tick(tick_ms);
        resolve_shots(&mut world, &report.shots);
        metrics.record_tick_time(started.elapsed());
        metrics.record_tick(&report);
        metrics
            .connections_active
            .store(world.connection_count() as u64, Ordering::Relaxed);

        for (connection, packet) in report.packets {
            let Some(client) = clients.iter_mut().find(|c| c.id == connection) else {
                continue;
            };
            let message = ServerMessage::Ghosts {
                tick: report.tick,
                payload: packet.bytes,
            };
            match encode(&message) {
                Ok(bytes) => client.inbox.push_back((report.now_ms + latency, bytes)),
                Err(e) => warn!("Failed to encode packet: {}", e),
            }
        }
        let stats: Vec<_> = clients.iter().map(|c| c.replica.stats()).collect();
        metrics.record_replicas(&stats);

        if report.tick % log_every == 0 {
            info!(
                "Tick {}: {} ships alive, {} kills, {} bytes/s, p95 {} us",
                report.tick,
                report.ships_alive,
                metrics.kills.load(Ordering::Relaxed),
                metrics.bytes_sent.load(Ordering::Relaxed) * 1000 / report.now_ms.max(1),
                metrics.tick_time_p95_us.load(Ordering::Relaxed),
            );
        }
    }

    for client in &clients {
        world.disconnect(client.id);
    }
    info!("Server stopped after {} ticks", world.tick_count());
    Ok(())
}
