// A session driven by a real websocket transport against a scripted backend.

use std::rc::Rc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rms::{AssistantSession, BrowserHost, Conversation, SessionConfig, StaticHost, ToolStatus};
use rms_protocol::ReconnectPolicy;
use rms_runtime::{Transport, TransportConfig, TransportEvent};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::LocalSet;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

async fn read_json<S>(socket: &mut S) -> Value
where
	S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
	loop {
		match timeout(WAIT, socket.next()).await.expect("read timeout") {
			Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
			Some(Ok(_)) => continue,
			other => panic!("unexpected socket item: {other:?}"),
		}
	}
}

#[tokio::test]
async fn backend_round_trip_over_websocket() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let url = format!("ws://{}/ws", listener.local_addr().unwrap());

	let backend = tokio::spawn(async move {
		let (stream, _) = listener.accept().await.unwrap();
		let mut ws = accept_async(stream).await.unwrap();

		let message = read_json(&mut ws).await;
		assert_eq!(message["type"], "message");
		assert_eq!(message["content"], "Find LDJ");
		assert_eq!(message["tabState"]["title"], "Lead");

		for frame in [
			json!({"type": "tool_call", "tool": "search_leads", "args": {"query": "LDJ"}, "toolCallId": "call-1"}),
			json!({"type": "tool_result", "toolCallId": "call-1", "result": {"leads": [{"id": "lead_1"}]}}),
			json!({"type": "browser_action", "actionId": "b-1", "action": "get_page_state"}),
		] {
			ws.send(Message::Text(frame.to_string())).await.unwrap();
		}

		let result = read_json(&mut ws).await;
		assert_eq!(result["type"], "browser_action_result");
		assert_eq!(result["actionId"], "b-1");
		assert_eq!(result["result"]["success"], true);
		assert_eq!(result["result"]["title"], "Lead");
		ws.close(None).await.ok();
	});

	LocalSet::new()
		.run_until(async move {
			let config = TransportConfig::new(url).with_reconnect(ReconnectPolicy::fixed(Duration::from_millis(20), 1));
			let (transport, handle, mut events) = Transport::new(config);
			tokio::spawn(transport.run());

			let host = Rc::new(StaticHost::new());
			host.open_tab("https://app.close.com/lead/lead_1/", "<title>Lead</title><input name=\"q\">");
			let mut session = AssistantSession::new(
				Rc::clone(&host) as Rc<dyn BrowserHost>,
				Rc::new(handle.clone()),
				Conversation::new(),
				SessionConfig::default(),
			);

			let mut frames = 0;
			while frames < 3 {
				match timeout(WAIT, events.recv()).await.expect("event timeout").expect("transport ended") {
					TransportEvent::State(state) if state.is_connected() => {
						session.send_message("Find LDJ").await.unwrap();
					}
					TransportEvent::Frame(frame) => {
						frames += 1;
						session.handle_frame(frame).await;
					}
					_ => {}
				}
			}

			let tools = session.conversation().tools();
			assert_eq!(tools.len(), 1);
			assert_eq!(tools[0].status, ToolStatus::Complete);
			assert_eq!(tools[0].result_summary.as_deref(), Some("Found 1 lead"));

			backend.await.unwrap();
			handle.shutdown();
		})
		.await;
}
