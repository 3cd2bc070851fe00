// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end tests for a full swarm on one bus
//!
//! A scripted provider stands in for the language model:
//! 1. Goal submission through decomposition, assignment and execution
//! 2. Heartbeat liveness of a single agent runtime
//! 3. Offline operation without a provider

use async_trait::async_trait;
use orion_core::domain::agent::{AgentHeartbeat, AgentId, AgentStatus};
use orion_core::domain::events::{Envelope, Message, TaskAssignment, Topic};
use orion_core::domain::llm::{
    FinishReason, GenerationOptions, GenerationResponse, LLMError, LLMProvider, TokenUsage,
};
use orion_core::domain::node_config::NodeConfig;
use orion_core::domain::repository::TaskRepository;
use orion_core::domain::task::TaskStatus;
use orion_core::domain::workflow::WorkflowState;
use orion_core::infrastructure::event_bus::EventBus;
use orion_swarm::application::runtime::{AgentRuntime, RuntimeConfig, TaskProcessor};
use orion_swarm::Orchestrator;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const DECOMPOSITION: &str = r#"{"tasks": [
    {"title": "Survey existing parsers", "type": "RESEARCH", "description": "Compare options"},
    {"title": "Define grammar", "type": "DESIGN", "description": "EBNF for the language"},
    {"title": "Write parser", "type": "CODING", "description": "Recursive descent"}
]}"#;

/// Answers decomposition prompts with three tasks and everything else with an outcome.
struct ScriptedModel {
    calls: AtomicUsize,
}

#[async_trait]
impl LLMProvider for ScriptedModel {
    async fn generate(
        &self,
        prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<GenerationResponse, LLMError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = if prompt.contains("task decomposition expert") {
            DECOMPOSITION.to_string()
        } else {
            json!({"summary": "Done", "output": "Detailed work product"}).to_string()
        };
        Ok(GenerationResponse {
            text,
            usage: TokenUsage::default(),
            provider: "scripted".into(),
            model: "test".into(),
            finish_reason: FinishReason::Stop,
        })
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        Ok(())
    }
}

fn fast_config() -> NodeConfig {
    let mut config = NodeConfig::default();
    config.agents.feasibility_delay = Duration::from_millis(10);
    config.agents.heartbeat_interval = Duration::from_millis(50);
    config.agents.error_backoff = Duration::from_millis(50);
    config
}

fn collect(bus: &EventBus, topic: Topic) -> mpsc::UnboundedReceiver<Arc<Envelope>> {
    let (tx, rx) = mpsc::unbounded_channel();
    bus.subscribe_fn(topic, "test-collect", move |envelope| {
        let tx = tx.clone();
        async move {
            tx.send(envelope)?;
            Ok::<(), anyhow::Error>(())
        }
    });
    rx
}

async fn take(rx: &mut mpsc::UnboundedReceiver<Arc<Envelope>>, n: usize) -> Vec<Arc<Envelope>> {
    let mut seen = Vec::with_capacity(n);
    while seen.len() < n {
        let envelope = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for envelopes")
            .expect("channel closed");
        seen.push(envelope);
    }
    seen
}

#[tokio::test]
async fn test_goal_runs_from_submission_to_design() {
    let model = Arc::new(ScriptedModel {
        calls: AtomicUsize::new(0),
    });
    let swarm = Orchestrator::new(&fast_config(), Some(model.clone())).unwrap();
    let executor = AgentId::new("GPTASe").unwrap();
    let mut assignments = collect(swarm.bus(), Topic::AgentTask(executor.clone()));
    let mut results = collect(swarm.bus(), Topic::TaskResult);
    swarm.start().await.unwrap();

    let goal_id = swarm
        .submit_goal("Build a parser", "For a small config language")
        .await
        .unwrap();

    let assigned = take(&mut assignments, 3).await;
    for envelope in &assigned {
        assert_eq!(envelope.source_id, "Director");
        match &envelope.payload {
            Message::TaskAssigned(task) => assert_eq!(task.assigned_to.as_ref(), Some(&executor)),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    let reported = take(&mut results, 3).await;
    for envelope in &reported {
        match &envelope.payload {
            Message::TaskResult(result) => {
                assert_eq!(result.status, TaskStatus::Completed);
                assert_eq!(result.result, Some(json!("Done | Detailed work product...")));
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    assert!(swarm
        .await_phase(goal_id, WorkflowState::DesignImplementation, Duration::from_secs(5))
        .await
        .unwrap());

    // Nothing beyond the three tasks is assigned or reported.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(assignments.try_recv().is_err());
    assert!(results.try_recv().is_err());

    let tasks = swarm.tasks().find_by_goal(goal_id).await.unwrap();
    assert_eq!(tasks.len(), 3);
    assert!(tasks.iter().all(|t| t.status() == TaskStatus::Completed));
    assert_eq!(
        tasks[0].result,
        Some(json!({"output": "Done | Detailed work product..."}))
    );
    // One decomposition plus one call per task.
    assert_eq!(model.calls.load(Ordering::SeqCst), 4);

    swarm.stop().await;
}

#[tokio::test]
async fn test_offline_swarm_settles_with_placeholder_output() {
    let swarm = Orchestrator::new(&fast_config(), None).unwrap();
    swarm.start().await.unwrap();

    let goal_id = swarm.submit_goal("Write docs", "User guide").await.unwrap();
    assert!(swarm.await_settled(goal_id, Duration::from_secs(5)).await.unwrap());

    let titles: Vec<String> = swarm
        .tasks()
        .find_by_goal(goal_id)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.title)
        .collect();
    assert_eq!(titles, vec!["Research Write docs", "Implement Write docs"]);

    swarm.stop().await;
}

#[tokio::test]
async fn test_monitor_sees_every_agent() {
    let swarm = Orchestrator::new(&fast_config(), None).unwrap();
    swarm.start().await.unwrap();

    let mut seen = 0;
    for _ in 0..100 {
        seen = swarm.monitor().snapshot().len();
        if seen == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(seen, 3);
    assert!(swarm.monitor().stalled(Duration::from_secs(5)).is_empty());

    swarm.stop().await;
    assert_eq!(swarm.bus().subscriber_count(&Topic::Heartbeat), 0);
}

struct Noop;

#[async_trait]
impl TaskProcessor for Noop {
    async fn process_task(&self, _task: &TaskAssignment) -> anyhow::Result<Value> {
        Ok(Value::Null)
    }
}

#[tokio::test]
async fn test_runtime_heartbeats_while_running() {
    let bus = EventBus::new(32);
    let mut heartbeats = collect(&bus, Topic::Heartbeat);
    let interval = Duration::from_millis(100);
    let agent = AgentRuntime::new(
        AgentId::new("test-agent").unwrap(),
        bus.clone(),
        Arc::new(Noop),
        RuntimeConfig {
            heartbeat_interval: interval,
            error_backoff: interval,
        },
    );

    agent.start().await.unwrap();
    tokio::time::sleep(interval * 2 + Duration::from_millis(50)).await;
    agent.stop().await;

    let mut received: Vec<AgentHeartbeat> = Vec::new();
    while let Ok(envelope) = heartbeats.try_recv() {
        if let Message::Heartbeat(heartbeat) = &envelope.payload {
            received.push(heartbeat.clone());
        }
    }
    assert!(received.len() >= 2, "only {} heartbeats", received.len());
    assert_eq!(received[0].agent_id.as_str(), "test-agent");
    assert_eq!(received[0].status, AgentStatus::Idle);
}

#[tokio::test]
async fn test_task_topic_drives_runtime() {
    let bus = EventBus::new(32);
    let mut results = collect(&bus, Topic::TaskResult);
    let worker = AgentId::new("worker").unwrap();
    let agent = AgentRuntime::new(worker.clone(), bus.clone(), Arc::new(Noop), RuntimeConfig::default());
    agent.start().await.unwrap();

    let task = TaskAssignment {
        id: orion_core::domain::task::TaskId::new(),
        kind: "test".into(),
        title: "Smoke check".into(),
        payload: json!({"foo": "bar"}),
        assigned_to: Some(worker.clone()),
    };
    bus.publish(Topic::AgentTask(worker), Message::TaskAssigned(task.clone()), "Director")
        .await
        .unwrap();

    let envelope = take(&mut results, 1).await.remove(0);
    assert_eq!(envelope.source_id, "worker");
    match &envelope.payload {
        Message::TaskResult(result) => {
            assert_eq!(result.task_id, task.id);
            assert_eq!(result.status, TaskStatus::Completed);
        }
        other => panic!("unexpected payload {other:?}"),
    }
    agent.stop().await;
}
