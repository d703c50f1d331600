//! Bus, workflow and speech dispatcher working together

use std::sync::Arc;
use std::time::Duration;

use chorus_api::agents::{Agent, CalendarAgent, PlannerAgent, WeatherAgent};
use chorus_api::bus::{BusConfig, CommandBus, EventKind};
use chorus_api::orchestration::{Topology, Workflow, WorkflowConfig, WorkflowOutput};
use chorus_api::streaming::{ChannelSink, DispatcherConfig, SpeechDispatcher};

fn reference_workflow(bus: &CommandBus) -> Workflow {
    let weather: Arc<dyn Agent> = Arc::new(WeatherAgent::new(bus.clone()));
    let calendar: Arc<dyn Agent> = Arc::new(CalendarAgent::new(bus.clone()));
    let planner: Arc<dyn Agent> = Arc::new(PlannerAgent::new(
        bus.clone(),
        vec![Arc::clone(&weather), Arc::clone(&calendar)],
    ));

    let config = WorkflowConfig {
        topology: Topology::Delegate,
        agent_timeout: Some(Duration::from_secs(5)),
        token_pause: Duration::ZERO,
    };
    Workflow::new(bus.clone(), config).with_agents([planner, weather, calendar])
}

#[tokio::test]
async fn test_agent_speech_reaches_sink_in_order() {
    let bus = CommandBus::start(BusConfig::default());
    let (sink, mut chunks) = ChannelSink::channel(32);
    let dispatcher = tokio::spawn(
        SpeechDispatcher::new(sink, DispatcherConfig::default()).run(bus.subscribe()),
    );
    let workflow = reference_workflow(&bus);

    workflow.run("What's the weather in Berlin?", None).await.unwrap();

    assert_eq!(chunks.recv().await.as_deref(), Some("I'll check that for you."));
    assert_eq!(
        chunks.recv().await.as_deref(),
        Some("The weather in Berlin is currently partly cloudy and 23°C.")
    );

    bus.shutdown();
    let dispatcher = dispatcher.await.unwrap();
    assert_eq!(dispatcher.pending(), "");
}

#[tokio::test]
async fn test_three_domain_request() {
    let bus = CommandBus::start(BusConfig::default());
    let workflow = reference_workflow(&bus);

    let report = workflow
        .run("Check weather in Seattle - schedule a meeting at 2pm - tell me a joke", None)
        .await
        .unwrap();

    let WorkflowOutput::Coordinated(response) = report.output else {
        panic!("expected fan-out");
    };
    assert_eq!(response.plan.agent_count(), 3);
    assert_eq!(response.combined.success_rate, 1.0);
    assert_eq!(response.combined.succeeded_agents.len(), 3);
    assert!(response.final_response.contains("Seattle"));
    assert!(response.final_response.contains("Added event 'New Event' to your calendar."));
    assert!(response.final_response.contains("scarecrow"));
}

#[tokio::test]
async fn test_slow_subscriber_does_not_hold_back_others() {
    let bus = CommandBus::start(BusConfig::default());
    let mut lazy = bus.subscribe_with_capacity(1);
    let mut attentive = bus.subscribe();
    let workflow = reference_workflow(&bus);

    workflow
        .run("Check weather in Tokyo, London, and Paris", None)
        .await
        .unwrap();
    bus.publish(EventKind::Status, Default::default(), Some("test"));

    // The lazy consumer keeps the one event it was holding, then its stream ends.
    assert!(lazy.next_event().await.is_some());
    assert!(lazy.next_event().await.is_none());

    // Everyone else still receives everything, up to the final marker.
    let mut tokens = 0;
    loop {
        let event = attentive.next_event().await.unwrap();
        if event.kind == EventKind::Token {
            tokens += 1;
        }
        if event.source.as_deref() == Some("test") {
            break;
        }
    }
    assert!(tokens > 0);
    assert_eq!(bus.subscriber_count().await, 1);
}
