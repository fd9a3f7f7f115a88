use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

/// What triggered a watch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchEventKind {
    /// A child of the watched node was created or deleted.
    ChildrenChanged,

    /// The watched node itself was deleted.
    NodeDeleted,

    /// The backend dropped the watch without delivering a change, e.g.
    /// because the owning session ended.
    WatchLost,
}

/// A single watch notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchEvent {
    /// What happened.
    pub kind: WatchEventKind,

    /// Path of the watched node.
    pub path: String,
}

/// Backend side of a one-shot watch.
#[derive(Debug)]
pub struct WatchSender {
    path: String,
    sender: oneshot::Sender<WatchEvent>,
}

impl WatchSender {
    /// Fires the watch. Consumes the sender; a watch fires at most once.
    pub fn fire(self, kind: WatchEventKind) {
        let event = WatchEvent {
            kind,
            path: self.path,
        };

        // The watcher may have stopped listening.
        let _ = self.sender.send(event);
    }
}

/// Client side of a one-shot watch.
///
/// Resolves to the next [`WatchEvent`] for the watched node. If the backend
/// drops its [`WatchSender`] without firing, resolves to
/// [`WatchEventKind::WatchLost`].
#[derive(Debug)]
pub struct Watch {
    path: String,
    receiver: oneshot::Receiver<WatchEvent>,
}

impl Watch {
    /// Creates a connected sender/watch pair for `path`.
    pub fn channel(path: impl Into<String>) -> (WatchSender, Self) {
        let path = path.into();
        let (sender, receiver) = oneshot::channel();

        (
            WatchSender {
                path: path.clone(),
                sender,
            },
            Self { path, receiver },
        )
    }
}

impl Future for Watch {
    type Output = WatchEvent;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(event)) => Poll::Ready(event),
            Poll::Ready(Err(_)) => Poll::Ready(WatchEvent {
                kind: WatchEventKind::WatchLost,
                path: self.path.clone(),
            }),
            Poll::Pending => Poll::Pending,
        }
    }
}
