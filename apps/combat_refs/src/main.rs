use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use skirmish::effects::EffectDef;
use skirmish::gear::{ArmorDef, Loadout, WeaponDef};
use skirmish::memory::{Delivery, MemoryWorld, Prototype};
use skirmish::{
    Command, CombatConfig, CommandError, EffectBook, ObjectId, Place, Reply, Room, RoomHandle,
    RuleSet, TickMode, spawn_room,
};

fn usage_and_exit() -> ! {
    eprintln!(
        "combat_refs\n\n\
USAGE:\n\
  combat_refs --scenario PATH [--config PATH]\n\
  combat_refs --suite PATH [--config PATH]\n\n\
ENV:\n\
  SKIRMISH_SEED       optional rng seed (u64); overrides config files\n\
  SKIRMISH_RULES      optional rule set: basic | gear\n\
  SKIRMISH_TURN_SECS  optional turn length in seconds\n"
    );
    std::process::exit(2);
}

#[derive(Clone, Debug)]
struct Config {
    scenario: Option<PathBuf>,
    suite: Option<PathBuf>,
    config: Option<PathBuf>,
    seed: Option<u64>,
    rules: Option<RuleSet>,
    turn_secs: Option<i64>,
}

fn parse_args() -> Config {
    let seed: Option<u64> = std::env::var("SKIRMISH_SEED")
        .ok()
        .and_then(|v| v.parse().ok());
    let rules = match std::env::var("SKIRMISH_RULES") {
        Ok(v) => Some(RuleSet::parse(&v).unwrap_or_else(|| usage_and_exit())),
        Err(_) => None,
    };
    let turn_secs: Option<i64> = std::env::var("SKIRMISH_TURN_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .map(|v: i64| v.max(1));

    let mut scenario: Option<PathBuf> = None;
    let mut suite: Option<PathBuf> = None;
    let mut config: Option<PathBuf> = None;

    let mut it = std::env::args().skip(1);
    while let Some(a) = it.next() {
        match a.as_str() {
            "--scenario" => {
                scenario = Some(
                    it.next()
                        .map(PathBuf::from)
                        .unwrap_or_else(|| usage_and_exit()),
                )
            }
            "--suite" => {
                suite = Some(
                    it.next()
                        .map(PathBuf::from)
                        .unwrap_or_else(|| usage_and_exit()),
                )
            }
            "--config" => {
                config = Some(
                    it.next()
                        .map(PathBuf::from)
                        .unwrap_or_else(|| usage_and_exit()),
                )
            }
            "-h" | "--help" => usage_and_exit(),
            _ => usage_and_exit(),
        }
    }

    if scenario.is_some() == suite.is_some() {
        usage_and_exit();
    }

    Config {
        scenario,
        suite,
        config,
        seed,
        rules,
        turn_secs,
    }
}

#[derive(Debug, Deserialize)]
struct SuiteFile {
    scenarios: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Scenario {
    id: String,
    #[serde(default)]
    location: Option<String>,
    /// Extra locations, e.g. a recovery room.
    #[serde(default)]
    other_locations: Vec<String>,
    /// Partial combat config, layered over the `--config` file.
    #[serde(default)]
    config: Option<serde_json::Value>,
    actors: Vec<Actor>,
    #[serde(default)]
    exits: Vec<String>,
    #[serde(default)]
    items: Vec<String>,
    #[serde(default)]
    prototypes: HashMap<String, Prototype>,
    #[serde(default)]
    effects: Vec<EffectDef>,
    steps: Vec<Step>,
    stop_on: Vec<StopOn>,
}

#[derive(Debug, Deserialize)]
struct Actor {
    name: String,
    #[serde(default = "default_health")]
    health: i32,
    #[serde(default)]
    resource: i32,
    #[serde(default)]
    weapon: Option<WeaponDef>,
    #[serde(default)]
    armor: Option<ArmorDef>,
    #[serde(default)]
    effects: Vec<String>,
    #[serde(default)]
    held: Vec<String>,
}

fn default_health() -> i32 {
    100
}

#[derive(Debug, Deserialize)]
struct Step {
    /// An actor name, or `@current` for whoever holds the turn. Targets may
    /// also say `@foe`.
    #[serde(default)]
    actor: Option<String>,
    op: String,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    targets: Vec<String>,
    #[serde(default)]
    effect: Option<String>,
    #[serde(default)]
    count: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StopOn {
    AnyContains { text: String },
}

#[derive(Debug, Clone, Serialize)]
struct ScenarioReport {
    id: String,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    err: Option<String>,
    duration_ms: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    matched: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tail: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct SuiteReport {
    ok: bool,
    reports: Vec<ScenarioReport>,
}

fn stop_matchers(stop_on: &[StopOn]) -> Vec<String> {
    stop_on
        .iter()
        .map(|s| match s {
            StopOn::AnyContains { text } => text.clone(),
        })
        .collect()
}

/// Shallow-merges `overlay` into `base`; nested objects merge too.
fn merge_json(base: &mut serde_json::Value, overlay: &serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(b), serde_json::Value::Object(o)) => {
            for (k, v) in o {
                match b.get_mut(k) {
                    Some(slot) => merge_json(slot, v),
                    None => {
                        b.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (b, o) => *b = o.clone(),
    }
}

fn scenario_config(
    base: &CombatConfig,
    cli: &Config,
    s: &Scenario,
) -> anyhow::Result<CombatConfig> {
    let mut cfg = match s.config.as_ref() {
        Some(overlay) => {
            let mut v = serde_json::to_value(base)?;
            merge_json(&mut v, overlay);
            serde_json::from_value(v).with_context(|| format!("config for {}", s.id))?
        }
        None => base.clone(),
    };
    if let Some(seed) = cli.seed {
        cfg.seed = Some(seed);
    }
    if let Some(rules) = cli.rules {
        cfg.rules = rules;
    }
    if let Some(t) = cli.turn_secs {
        cfg.turn_secs = t;
    }
    Ok(cfg)
}

struct Stage {
    handle: RoomHandle<MemoryWorld>,
    outbox: mpsc::UnboundedReceiver<Delivery>,
    names: HashMap<String, ObjectId>,
    labels: HashMap<ObjectId, String>,
    fighters: Vec<ObjectId>,
    current: Option<ObjectId>,
}

fn build_stage(s: &Scenario, cfg: CombatConfig) -> anyhow::Result<Stage> {
    let (tx, outbox) = mpsc::unbounded_channel();
    let mut w = MemoryWorld::new().with_outbox(tx);
    let here = w.add_location(s.location.as_deref().unwrap_or("arena"));
    for l in &s.other_locations {
        w.add_location(l);
    }

    let mut names = HashMap::new();
    let mut fighters = Vec::new();
    for a in &s.actors {
        let id = w.add_character(&a.name, here, a.health);
        fighters.push(id);
        w.set_resource(id, a.resource);
        w.set_loadout(
            id,
            Loadout {
                weapon: a.weapon,
                armor: a.armor,
            },
        );
        for e in &a.effects {
            w.teach(id, e);
        }
        for item in &a.held {
            let it = w.add_item(item, Place::HeldBy(id));
            names.insert(item.to_ascii_lowercase(), it);
        }
        names.insert(a.name.to_ascii_lowercase(), id);
    }
    for e in &s.exits {
        let id = w.add_exit(e, here);
        names.insert(e.to_ascii_lowercase(), id);
    }
    for i in &s.items {
        let id = w.add_item(i, Place::Location(here));
        names.insert(i.to_ascii_lowercase(), id);
    }
    for (k, p) in &s.prototypes {
        w.add_prototype(k, p.clone());
    }

    let mut book = EffectBook::new();
    for d in &s.effects {
        book.insert(d.clone());
    }

    let labels = names.iter().map(|(k, v)| (*v, k.clone())).collect();
    let room = Room::new(here, cfg, book);
    Ok(Stage {
        handle: spawn_room(room, w, TickMode::Manual),
        outbox,
        names,
        labels,
        fighters,
        current: None,
    })
}

impl Stage {
    fn resolve(&self, name: &str) -> anyhow::Result<ObjectId> {
        match name {
            "@current" => return self.current.context("@current used before a fight started"),
            // First actor, in scenario order, whose turn it isn't.
            "@foe" => {
                return self
                    .fighters
                    .iter()
                    .copied()
                    .find(|id| Some(*id) != self.current)
                    .context("@foe needs two actors");
            }
            _ => {}
        }
        self.names
            .get(&name.to_ascii_lowercase())
            .copied()
            .with_context(|| format!("unknown object: {name}"))
    }

    fn command(&self, st: &Step) -> anyhow::Result<Command> {
        let target = || {
            st.target
                .as_deref()
                .context("step needs a target")
                .and_then(|t| self.resolve(t))
        };
        Ok(match st.op.as_str() {
            "fight" => Command::StartEncounter,
            "attack" => Command::Attack(target()?),
            "shoot" => Command::Shoot(target()?),
            "approach" => Command::Approach(target()?),
            "withdraw" => Command::Withdraw(target()?),
            "cast" => Command::Cast {
                effect: st.effect.clone().context("cast needs an effect")?,
                targets: st
                    .targets
                    .iter()
                    .map(|t| self.resolve(t))
                    .collect::<anyhow::Result<Vec<_>>>()?,
            },
            "pass" => Command::Pass,
            "disengage" => Command::Disengage,
            "status" => Command::Status,
            "rest" => Command::Rest,
            "drop" => Command::Drop(target()?),
            "get" => Command::Get(target()?),
            "abort" => Command::Abort,
            other => anyhow::bail!("unknown op: {other}"),
        })
    }

    /// Moves whatever the world emitted into `tail`, tracking whose turn it is.
    fn drain(&mut self, matchers: &[String], tail: &mut Vec<String>, matched: &mut Vec<String>) {
        while let Ok(d) = self.outbox.try_recv() {
            if let skirmish::Event::YourTurn { .. } = d.event {
                if let skirmish::Audience::One(id) = d.to {
                    self.current = Some(id);
                }
            }
            let txt = d.event.to_string();
            let who = d
                .recipients
                .iter()
                .map(|id| self.labels.get(id).map_or_else(|| id.to_string(), |l| l.clone()))
                .collect::<Vec<_>>()
                .join(",");
            let one = txt.replace('\r', "").replace('\n', "\\n");
            tail.push(format!("{who}: {one}"));
            if tail.len() > 25 {
                tail.drain(0..(tail.len() - 25));
            }
            for m in matchers {
                if txt.contains(m.as_str()) && !matched.contains(m) {
                    matched.push(m.clone());
                }
            }
        }
    }
}

async fn run_steps(
    stage: &mut Stage,
    s: &Scenario,
    matchers: &[String],
    tail: &mut Vec<String>,
    matched: &mut Vec<String>,
) -> anyhow::Result<()> {
    for (i, st) in s.steps.iter().enumerate() {
        match st.op.as_str() {
            "tick" => {
                for _ in 0..st.count.unwrap_or(1) {
                    stage.handle.tick().await?;
                }
            }
            "enter" | "leave" => {
                let obj = stage.resolve(st.target.as_deref().context("step needs a target")?)?;
                if st.op == "enter" {
                    stage.handle.entered(obj).await?;
                } else {
                    stage.handle.left(obj).await?;
                }
            }
            _ => {
                let actor = stage.resolve(st.actor.as_deref().context("step needs an actor")?)?;
                let cmd = stage.command(st)?;
                match stage.handle.command(actor, cmd).await {
                    Ok(Reply::Started { order }) => {
                        info!(scenario = %s.id, fighters = order.len(), "fight started");
                    }
                    Ok(_) => {}
                    Err(CommandError::Unavailable) => anyhow::bail!("room task went away"),
                    // Refusals are reported through the outbox like any other event.
                    Err(_) => {}
                }
            }
        }
        stage.drain(matchers, tail, matched);
        tracing::debug!(scenario = %s.id, step = i, op = %st.op, "step done");
    }
    Ok(())
}

async fn run_scenario(base: &CombatConfig, cli: &Config, s: &Scenario) -> ScenarioReport {
    let start = Instant::now();
    let mut matched: Vec<String> = Vec::new();
    let mut tail: Vec<String> = Vec::new();
    let matchers = stop_matchers(&s.stop_on);

    let res = async {
        let cfg = scenario_config(base, cli, s)?;
        let mut stage = build_stage(s, cfg)?;
        run_steps(&mut stage, s, &matchers, &mut tail, &mut matched).await?;
        stage.handle.shutdown().await;
        stage.drain(&matchers, &mut tail, &mut matched);
        anyhow::Ok(())
    }
    .await;

    let err = match res {
        Err(e) => Some(format!("{e:#}")),
        Ok(()) if matched.len() < matchers.len() => Some("expected output not seen".to_string()),
        Ok(()) => None,
    };
    if let Some(e) = err.as_deref() {
        warn!(scenario = %s.id, err = %e, "scenario failed");
    }
    ScenarioReport {
        id: s.id.clone(),
        ok: err.is_none(),
        err,
        duration_ms: start.elapsed().as_millis() as u64,
        matched,
        tail,
    }
}

fn load_scenario(path: &Path) -> anyhow::Result<Scenario> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,skirmish=info".into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cfg = parse_args();
    let base = match cfg.config.as_ref() {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("read {}", path.display()))?;
            CombatConfig::from_json_str(&raw).with_context(|| "parse config")?
        }
        None => CombatConfig::default(),
    };

    let mut reports = Vec::new();
    let mut suite_ok = true;

    if let Some(path) = cfg.scenario.as_ref() {
        let s = load_scenario(path)?;
        let rep = run_scenario(&base, &cfg, &s).await;
        suite_ok &= rep.ok;
        reports.push(rep);
    } else if let Some(path) = cfg.suite.as_ref() {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let suite: SuiteFile = serde_json::from_str(&raw).with_context(|| "parse suite")?;

        // Suite entries are relative to the suite file.
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        for sp in suite.scenarios {
            let s = load_scenario(&dir.join(&sp))?;
            let rep = run_scenario(&base, &cfg, &s).await;
            suite_ok &= rep.ok;
            reports.push(rep);
        }
    }

    info!(scenarios = reports.len(), ok = suite_ok, "combat refs done");
    let out = SuiteReport {
        ok: suite_ok,
        reports,
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    if !suite_ok {
        std::process::exit(1);
    }
    Ok(())
}
