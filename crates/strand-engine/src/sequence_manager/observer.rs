//! Task observers

use crate::task::TaskMetadata;
use std::rc::Rc;

/// Notified around every task the loop runs
///
/// Callbacks run on the loop thread in registration order. An observer must
/// not add or remove observers from inside a callback.
pub trait TaskObserver {
    /// Called right before the task runs
    fn on_task_started(&self, task: &TaskMetadata);

    /// Called right after the task returns
    fn on_task_completed(&self, task: &TaskMetadata);
}

#[derive(Default)]
pub(crate) struct ObserverList {
    observers: Vec<Rc<dyn TaskObserver>>,
}

impl ObserverList {
    pub(crate) fn add(&mut self, observer: Rc<dyn TaskObserver>) {
        self.observers.push(observer);
    }

    pub(crate) fn remove(&mut self, observer: &Rc<dyn TaskObserver>) -> bool {
        let before = self.observers.len();
        self.observers
            .retain(|o| !std::ptr::addr_eq(Rc::as_ptr(o), Rc::as_ptr(observer)));
        self.observers.len() != before
    }

    /// Copy of the list to notify without holding a borrow
    pub(crate) fn snapshot(&self) -> Vec<Rc<dyn TaskObserver>> {
        self.observers.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl TaskObserver for Noop {
        fn on_task_started(&self, _task: &TaskMetadata) {}
        fn on_task_completed(&self, _task: &TaskMetadata) {}
    }

    #[test]
    fn test_add_remove() {
        let mut list = ObserverList::default();
        let a: Rc<dyn TaskObserver> = Rc::new(Noop);
        let b: Rc<dyn TaskObserver> = Rc::new(Noop);
        list.add(a.clone());
        list.add(b.clone());
        assert_eq!(list.snapshot().len(), 2);

        assert!(list.remove(&a));
        assert!(!list.remove(&a));
        let remaining = list.snapshot();
        assert_eq!(remaining.len(), 1);
        assert!(Rc::ptr_eq(&remaining[0], &b));

        assert!(list.remove(&b));
        assert!(list.snapshot().is_empty());
    }
}
