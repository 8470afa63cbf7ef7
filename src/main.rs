//! Arena Agent 驱动程序
//!
//! 用法：arena-agent <task.json> [--config <path>]
//!
//! 读取任务文件，reset 后以同步循环调用 next_action，直到 Stop 或达到 run.max_steps；
//! 打印答案，配置了 run.result_dir 时写出 JSON 结果。

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use arena_agent::config::load_config;
use arena_agent::session::{last_known_url, Action, StateInfo, TaskMeta, TrajectoryStep};
use arena_agent::{observability, ArenaAgent};

#[derive(Debug, Deserialize)]
struct TaskFile {
    #[serde(default)]
    task_id: Value,
    intent: String,
    #[serde(default)]
    start_url: Option<String>,
    #[serde(default)]
    action_history: Vec<String>,
}

#[derive(Debug, Serialize)]
struct RunResult<'a> {
    task_id: &'a Value,
    intent: &'a str,
    answer: Option<&'a str>,
    completed: bool,
    steps: u32,
    transcript: &'a str,
    finished_at: String,
}

fn parse_args() -> anyhow::Result<(PathBuf, Option<PathBuf>)> {
    let mut args = std::env::args().skip(1);
    let mut task = None;
    let mut config = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(PathBuf::from(args.next().context("--config needs a path")?)),
            _ if task.is_none() => task = Some(PathBuf::from(arg)),
            other => bail!("unexpected argument: {other}"),
        }
    }
    let task = task.context("usage: arena-agent <task.json> [--config <path>]")?;
    Ok((task, config))
}

fn write_result(dir: &Path, task_id: &Value, result: &RunResult<'_>) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let id = match task_id {
        Value::String(s) => s.clone(),
        Value::Null => "task".to_string(),
        other => other.to_string(),
    };
    let path = dir.join(format!(
        "{}_{}.json",
        id,
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ));
    std::fs::write(&path, serde_json::to_string_pretty(result)?)
        .with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

fn main() -> anyhow::Result<()> {
    observability::init();

    let (task_path, config_path) = parse_args()?;
    let cfg = load_config(config_path).context("Failed to load config")?;
    let raw = std::fs::read_to_string(&task_path)
        .with_context(|| format!("read task file {}", task_path.display()))?;
    let task: TaskFile = serde_json::from_str(&raw).context("parse task file")?;

    let mut agent = ArenaAgent::from_config(&cfg).context("Failed to create agent")?;
    agent.reset(&task_path.display().to_string());

    let meta = TaskMeta {
        action_history: task.action_history.clone(),
    };
    let mut trajectory = vec![TrajectoryStep::State(match &task.start_url {
        Some(url) => StateInfo::at_url(url.clone()),
        None => StateInfo::default(),
    })];

    // 外层循环不观察页面，下一步状态沿用最近已知的 URL
    let carry_state = |trajectory: &[TrajectoryStep]| match last_known_url(trajectory) {
        Some(url) => StateInfo::at_url(url),
        None => StateInfo::default(),
    };

    let mut transcript = String::new();
    for _ in 0..cfg.run.max_steps {
        match agent.next_action(&trajectory, &task.intent, &meta) {
            Ok(Action::Stop { raw_prediction, .. }) => {
                transcript = raw_prediction;
                break;
            }
            Ok(Action::Continue) => {
                let next = carry_state(&trajectory);
                trajectory.push(TrajectoryStep::Action(Action::Continue));
                trajectory.push(TrajectoryStep::State(next));
            }
            Err(e) => {
                tracing::error!(error = %e, step = agent.state().step(), "step failed");
                let next = carry_state(&trajectory);
                trajectory.push(TrajectoryStep::State(next));
            }
        }
    }

    let state = agent.state();
    if !state.is_completed() {
        tracing::warn!(max_steps = cfg.run.max_steps, "task did not complete");
    }
    println!("{}", state.final_answer().unwrap_or(""));

    if let Some(dir) = &cfg.run.result_dir {
        let result = RunResult {
            task_id: &task.task_id,
            intent: &task.intent,
            answer: state.final_answer(),
            completed: state.is_completed(),
            steps: state.step(),
            transcript: &transcript,
            finished_at: chrono::Local::now().to_rfc3339(),
        };
        let path = write_result(dir, &task.task_id, &result)?;
        tracing::info!(path = %path.display(), "result written");
    }
    Ok(())
}
