//! Event listeners for [`Document`](super::Document).
//!
//! Listeners live in a shared list owned by the document; registering one
//! returns a [`Subscription`] that removes it again on drop.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use ego_tree::NodeId;

/// Unique identifier for event listeners.
pub type ListenerId = u64;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a new globally-unique listener ID.
pub fn next_listener_id() -> ListenerId {
	NEXT_LISTENER_ID.fetch_add(1, Ordering::SeqCst)
}

/// DOM events the automation layer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
	Input,
	Change,
	Focus,
	Blur,
	Click,
}

impl EventKind {
	pub fn as_str(self) -> &'static str {
		match self {
			EventKind::Input => "input",
			EventKind::Change => "change",
			EventKind::Focus => "focus",
			EventKind::Blur => "blur",
			EventKind::Click => "click",
		}
	}
}

/// Event delivered to listeners.
///
/// Carries a snapshot of the target's form state at dispatch time, which is
/// what a framework listener reads back (`event.target.value`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomEvent {
	pub kind: EventKind,
	pub target: NodeId,
	pub value: String,
	pub checked: bool,
}

/// Listener callback.
pub type ListenerFn = Rc<dyn Fn(&DomEvent)>;

pub struct ListenerEntry {
	pub id: ListenerId,
	/// `None` listens on the whole document.
	pub target: Option<NodeId>,
	pub kind: EventKind,
	pub listener: ListenerFn,
}

/// Listener storage in registration order.
pub type ListenerMap = Rc<RefCell<Vec<ListenerEntry>>>;

/// RAII handle that removes a listener on drop.
///
/// Holds a weak reference to the listener list, so dropping it after the
/// document is gone is a no-op.
pub struct Subscription {
	id: ListenerId,
	listeners: Option<Weak<RefCell<Vec<ListenerEntry>>>>,
}

impl Subscription {
	pub(crate) fn new(id: ListenerId, listeners: &ListenerMap) -> Self {
		Self {
			id,
			listeners: Some(Rc::downgrade(listeners)),
		}
	}

	pub fn id(&self) -> ListenerId {
		self.id
	}

	/// Explicitly unsubscribes. Equivalent to dropping.
	pub fn unsubscribe(mut self) {
		self.remove();
	}

	fn remove(&mut self) {
		if let Some(map) = self.listeners.take().and_then(|weak| weak.upgrade()) {
			map.borrow_mut().retain(|entry| entry.id != self.id);
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.remove();
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription")
			.field("id", &self.id)
			.field("active", &self.listeners.is_some())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn entry(id: ListenerId) -> ListenerEntry {
		ListenerEntry {
			id,
			target: None,
			kind: EventKind::Input,
			listener: Rc::new(|_| {}),
		}
	}

	#[test]
	fn listener_ids_increment() {
		let a = next_listener_id();
		let b = next_listener_id();
		assert!(b > a);
	}

	#[test]
	fn dropping_subscription_removes_listener() {
		let map: ListenerMap = Rc::new(RefCell::new(Vec::new()));
		let id = next_listener_id();
		map.borrow_mut().push(entry(id));
		map.borrow_mut().push(entry(next_listener_id()));

		{
			let _sub = Subscription::new(id, &map);
		}

		assert_eq!(map.borrow().len(), 1);
		assert!(map.borrow().iter().all(|e| e.id != id));
	}

	#[test]
	fn subscription_outliving_map_is_harmless() {
		let map: ListenerMap = Rc::new(RefCell::new(Vec::new()));
		let id = next_listener_id();
		map.borrow_mut().push(entry(id));

		let sub = Subscription::new(id, &map);
		drop(map);
		sub.unsubscribe();
	}
}
