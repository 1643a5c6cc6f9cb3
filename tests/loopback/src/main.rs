//! End-to-end tests: agents against an in-process WebSocket broker.

mod broker;

fn main() {
    println!("Run `cargo test -p loopback` to execute the end-to-end tests.");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use serde_json::json;

    use framelink_protocol::{Frame, Kind};
    use framelink_runtime::{
        Agent, AgentConfig, AgentState, Handler, QueueTransport, Transport, TransportFactory,
    };

    use crate::broker::Broker;

    fn test_agent(name: &str) -> Agent {
        let mut config = AgentConfig::default();
        config.install_signal_handlers = false;
        config.ensure_connection_interval = Duration::from_millis(50);
        Agent::with_config(name, config)
    }

    async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
    }

    #[tokio::test]
    async fn event_round_trips_through_the_broker() {
        let broker = Broker::spawn(true).await;
        let agent = test_agent("echo-agent");

        let heard = Arc::new(AtomicBool::new(false));
        let flag = heard.clone();
        agent
            .on_event(
                "hello",
                Handler::new(move |frame| {
                    let flag = flag.clone();
                    async move {
                        assert_eq!(frame.data()["x"], 1);
                        flag.store(true, Ordering::SeqCst);
                        Ok(None)
                    }
                }),
            )
            .unwrap();

        let runner = {
            let agent = agent.clone();
            let endpoint = broker.endpoint.clone();
            tokio::spawn(async move { agent.run(&endpoint, "test-token").await })
        };
        wait_until("connect", || agent.is_connected()).await;

        agent.emit("hello", json!({ "x": 1 })).unwrap();
        wait_until("echoed event", || heard.load(Ordering::SeqCst)).await;

        agent.stop();
        runner.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn rejected_login_stops_the_agent() {
        let broker = Broker::spawn(false).await;
        let agent = test_agent("rejected-agent");

        let endpoint = broker.endpoint.clone();
        agent.run(&endpoint, "fail-token").await.unwrap();
        assert_eq!(agent.state(), AgentState::Stopped);
        assert!(!agent.is_connected());
    }

    #[tokio::test]
    async fn filter_then_join_lead_every_connection() {
        let broker = Broker::spawn(false).await;
        let agent = test_agent("spaces-agent");
        agent
            .on_event("hello", Handler::nullary(|| async { Ok(None) }))
            .unwrap();
        agent
            .on_request("whoami", Handler::nullary(|| async { Ok(None) }))
            .unwrap();

        let runner = {
            let agent = agent.clone();
            let endpoint = broker.endpoint.clone();
            tokio::spawn(async move { agent.run(&endpoint, "test-token").await })
        };
        wait_until("connect", || agent.is_connected()).await;

        let filter = broker.wait_for_frame(1, "filter").await;
        assert_eq!(filter.kind(), Kind::Command);
        assert_eq!(filter.data()["names"]["event"], json!(["hello"]));
        assert_eq!(filter.data()["names"]["request"], json!(["whoami"]));
        assert!(filter.data()["size"].as_u64().unwrap() > 0);

        agent.join("home").await.unwrap();
        let join = broker.wait_for_frame(1, "join").await;
        assert_eq!(join.data()["spaces"], json!(["home"]));

        // Drop the wire; the heartbeat redials and must restore state.
        broker.drop_connections();
        wait_until("disconnect", || !agent.is_connected()).await;
        broker.wait_for_connection(2).await;
        wait_until("reconnect", || agent.is_connected()).await;

        broker.wait_for_frame(2, "join").await;
        let second: Vec<Frame> = broker
            .frames()
            .into_iter()
            .filter(|(id, _)| *id == 2)
            .map(|(_, frame)| frame)
            .collect();
        assert_eq!(second[0].name(), "filter");
        assert_eq!(second[1].name(), "join");
        assert_eq!(second[1].data()["spaces"], json!(["home"]));

        agent.stop();
        runner.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn broker_ping_elicits_pong_to_same_uuid() {
        let broker = Broker::spawn(false).await;
        let agent = test_agent("ping-agent");

        let runner = {
            let agent = agent.clone();
            let endpoint = broker.endpoint.clone();
            tokio::spawn(async move { agent.run(&endpoint, "test-token").await })
        };
        wait_until("connect", || agent.is_connected()).await;

        let ping = Frame::command("ping").unwrap();
        broker.push(ping.clone());

        let pong = broker.wait_for_frame(1, "pong").await;
        assert_eq!(pong.kind(), Kind::Command);
        assert_eq!(pong.reply_to(), Some(ping.uuid()));

        agent.stop();
        runner.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn request_resolves_over_the_wire() {
        // Echo broker: the agent's own request comes back, its request
        // handler answers, and the echoed response settles the call.
        let broker = Broker::spawn(true).await;
        let agent = test_agent("loopback-agent");
        agent
            .on_request(
                "whoami",
                Handler::nullary(|| async { Ok(Some(json!({ "name": "loopback-agent" }))) }),
            )
            .unwrap();

        let runner = {
            let agent = agent.clone();
            let endpoint = broker.endpoint.clone();
            tokio::spawn(async move { agent.run(&endpoint, "test-token").await })
        };
        wait_until("connect", || agent.is_connected()).await;

        let value = agent
            .request("whoami", Duration::from_secs(1), json!({}))
            .await
            .unwrap();
        assert_eq!(value, json!({ "name": "loopback-agent" }));

        agent.stop();
        runner.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn unanswered_request_times_out() {
        // Non-echo broker swallows the request.
        let broker = Broker::spawn(false).await;
        let agent = test_agent("impatient-agent");

        let runner = {
            let agent = agent.clone();
            let endpoint = broker.endpoint.clone();
            tokio::spawn(async move { agent.run(&endpoint, "test-token").await })
        };
        wait_until("connect", || agent.is_connected()).await;

        let err = agent
            .request("whoami", Duration::from_millis(100), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            framelink_runtime::AgentError::RequestTimeout { .. }
        ));

        agent.stop();
        runner.await.unwrap().unwrap();
    }

    /// Factory producing scripted in-memory transports: each dial
    /// hands the test a [`framelink_runtime::QueuePeer`] to drive.
    fn scripted_factory() -> (
        TransportFactory,
        tokio::sync::mpsc::UnboundedReceiver<framelink_runtime::QueuePeer>,
    ) {
        let (peer_tx, peer_rx) = tokio::sync::mpsc::unbounded_channel();
        let factory: TransportFactory = Arc::new(move |_endpoint, token| {
            let peer_tx = peer_tx.clone();
            Box::pin(async move {
                let (transport, peer) = QueueTransport::pair();
                let answering = tokio::spawn(async move {
                    peer.expect_login(true).await.unwrap();
                    peer
                });
                let transport = Transport::from_queue(transport, &token).await?;
                let _ = peer_tx.send(answering.await.unwrap());
                Ok(transport)
            })
        });
        (factory, peer_rx)
    }

    #[tokio::test]
    async fn scripted_peer_answers_a_request() {
        let agent = test_agent("scripted-agent");
        let (factory, mut peers) = scripted_factory();
        agent.set_transport_factory(factory);

        let runner = {
            let agent = agent.clone();
            tokio::spawn(async move { agent.run("queue://broker", "test-token").await })
        };
        let peer = peers.recv().await.unwrap();

        // Subscription setup happens before anything else.
        let filter = peer.recv().await.unwrap();
        assert_eq!(filter.name(), "filter");

        let answered = tokio::spawn(async move {
            let request = loop {
                let frame = peer.recv().await.unwrap();
                if frame.kind() == Kind::Request {
                    break frame;
                }
            };
            assert_eq!(request.name(), "whoami");
            let reply = request
                .reply()
                .with_data(json!({ "name": "scripted-peer" }))
                .unwrap();
            peer.send(reply).unwrap();
        });

        let value = agent
            .request("whoami", Duration::from_secs(1), json!({}))
            .await
            .unwrap();
        assert_eq!(value, json!({ "name": "scripted-peer" }));
        answered.await.unwrap();

        agent.stop();
        runner.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn two_agents_converse_through_the_echo_broker() {
        // Two independent agents on one broker. The broker echoes to
        // the sender only, so each agent talks to its own reflection;
        // what this exercises is several concurrent runtimes sharing
        // one listener.
        let broker = Broker::spawn(true).await;

        let heard = Arc::new(StdMutex::new(Vec::new()));
        let mut runners = Vec::new();
        let mut agents = Vec::new();
        for name in ["first-agent", "second-agent"] {
            let agent = test_agent(name);
            let sink = heard.clone();
            let tag = name.to_owned();
            agent
                .on_event(
                    "announce",
                    Handler::new(move |frame| {
                        let sink = sink.clone();
                        let tag = tag.clone();
                        async move {
                            sink.lock()
                                .unwrap()
                                .push((tag, frame.data()["from"].clone()));
                            Ok(None)
                        }
                    }),
                )
                .unwrap();
            let endpoint = broker.endpoint.clone();
            let run_agent = agent.clone();
            runners.push(tokio::spawn(async move {
                run_agent.run(&endpoint, "test-token").await
            }));
            agents.push(agent);
        }
        for agent in &agents {
            let agent = agent.clone();
            wait_until("connect", move || agent.is_connected()).await;
        }

        for agent in &agents {
            agent
                .emit("announce", json!({ "from": agent.name() }))
                .unwrap();
        }
        wait_until("both echoes", || heard.lock().unwrap().len() == 2).await;

        for (tag, from) in heard.lock().unwrap().iter() {
            assert_eq!(from, &json!(tag));
        }

        for agent in &agents {
            agent.stop();
        }
        for runner in runners {
            runner.await.unwrap().unwrap();
        }
    }
}
