use std::time::Duration;

use futures_util::StreamExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::NetEvent;
use super::connection::{SocketEvent, StreamEvent, StreamKey, StreamSignal};

/// Owns a spawned socket or timer task. Cancelling is idempotent and dropping
/// the handle cancels the task.
#[derive(Debug, Default)]
pub struct TaskHandle(Option<AbortHandle>);

impl TaskHandle {
    pub fn detached() -> Self {
        Self(None)
    }

    pub fn from_join<T>(handle: JoinHandle<T>) -> Self {
        Self(Some(handle.abort_handle()))
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Opens sockets and arms reconnect timers. Everything a task observes comes
/// back as a [`StreamEvent`] tagged with the generation or ticket it was
/// started with.
pub trait Transport {
    fn open(&mut self, key: &StreamKey, generation: u64, url: &str) -> TaskHandle;

    fn schedule_reconnect(&mut self, key: &StreamKey, ticket: u64, delay: Duration) -> TaskHandle;
}

pub struct TokioTransport {
    runtime: Handle,
    events: UnboundedSender<NetEvent>,
}

impl TokioTransport {
    pub fn new(runtime: Handle, events: UnboundedSender<NetEvent>) -> Self {
        Self { runtime, events }
    }
}

impl Transport for TokioTransport {
    fn open(&mut self, key: &StreamKey, generation: u64, url: &str) -> TaskHandle {
        let task = run_socket(key.clone(), generation, url.to_owned(), self.events.clone());
        TaskHandle::from_join(self.runtime.spawn(task))
    }

    fn schedule_reconnect(&mut self, key: &StreamKey, ticket: u64, delay: Duration) -> TaskHandle {
        let key = key.clone();
        let events = self.events.clone();
        TaskHandle::from_join(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(NetEvent::Stream(StreamEvent {
                key,
                signal: StreamSignal::ReconnectDue { ticket },
            }));
        }))
    }
}

async fn run_socket(
    key: StreamKey,
    generation: u64,
    url: String,
    events: UnboundedSender<NetEvent>,
) {
    let emit = |event: SocketEvent| {
        let _ = events.send(NetEvent::Stream(StreamEvent {
            key: key.clone(),
            signal: StreamSignal::Socket { generation, event },
        }));
    };

    let mut stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(error) => {
            warn!(%key, %url, %error, "stream connection failed");
            emit(SocketEvent::Failed(error.to_string()));
            return;
        }
    };

    info!(%key, %url, generation, "stream connected");
    emit(SocketEvent::Opened);

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => emit(SocketEvent::Text(text.as_str().to_owned())),
            Ok(Message::Close(frame)) => {
                debug!(%key, ?frame, "stream closed by peer");
                emit(SocketEvent::Closed { clean: true });
                return;
            }
            Ok(Message::Binary(bytes)) => {
                debug!(%key, len = bytes.len(), "ignoring binary frame");
            }
            Ok(_) => {}
            Err(error) => {
                warn!(%key, %error, "stream read failed");
                emit(SocketEvent::Failed(error.to_string()));
                return;
            }
        }
    }

    emit(SocketEvent::Closed { clean: false });
}

#[cfg(test)]
pub(crate) mod recording {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    use super::{TaskHandle, Transport};
    use crate::net::connection::StreamKey;

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub(crate) enum Call {
        Open {
            key: StreamKey,
            generation: u64,
            url: String,
        },
        Timer {
            key: StreamKey,
            ticket: u64,
            delay: Duration,
        },
    }

    /// Records every request instead of touching the network.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingTransport {
        calls: Rc<RefCell<Vec<Call>>>,
    }

    impl RecordingTransport {
        pub(crate) fn calls(&self) -> Vec<Call> {
            self.calls.borrow().clone()
        }

        pub(crate) fn opens(&self) -> Vec<(StreamKey, u64, String)> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    Call::Open {
                        key,
                        generation,
                        url,
                    } => Some((key, generation, url)),
                    Call::Timer { .. } => None,
                })
                .collect()
        }

        pub(crate) fn timers(&self) -> Vec<(StreamKey, u64, Duration)> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    Call::Timer { key, ticket, delay } => Some((key, ticket, delay)),
                    Call::Open { .. } => None,
                })
                .collect()
        }
    }

    impl Transport for RecordingTransport {
        fn open(&mut self, key: &StreamKey, generation: u64, url: &str) -> TaskHandle {
            self.calls.borrow_mut().push(Call::Open {
                key: key.clone(),
                generation,
                url: url.to_owned(),
            });
            TaskHandle::detached()
        }

        fn schedule_reconnect(
            &mut self,
            key: &StreamKey,
            ticket: u64,
            delay: Duration,
        ) -> TaskHandle {
            self.calls.borrow_mut().push(Call::Timer {
                key: key.clone(),
                ticket,
                delay,
            });
            TaskHandle::detached()
        }
    }
}
