mod common;

use common::init_tracing;
use ng_da_core::{
    chain::processors::{Negate, Scale},
    DataItem, ItemDescriptor,
};
use ng_da_sdk::{
    AttributeMap, AttributeSnapshot, CommandListener, DaError, DaResult, FnCommandListener,
    IODirections, ItemKind, ItemListener, Variant, VariantType,
};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc, Arc, Barrier, Mutex,
    },
    thread,
    time::Duration,
};

/// Sink that parks inside value delivery until released.
struct BlockingSink {
    entered: Arc<Barrier>,
    release: Arc<Barrier>,
}

impl ItemListener for BlockingSink {
    fn notify_value(&self, _item_id: &str, _value: &Variant) -> DaResult<()> {
        self.entered.wait();
        self.release.wait();
        Ok(())
    }

    fn notify_attributes(&self, _item_id: &str, _attributes: &AttributeSnapshot) -> DaResult<()> {
        Ok(())
    }
}

fn collecting(seen: &Arc<Mutex<Vec<Variant>>>) -> Arc<dyn CommandListener> {
    let seen = Arc::clone(seen);
    Arc::new(FnCommandListener::new("collect", move |v: &Variant| {
        seen.lock().unwrap().push(v.clone());
        Ok(())
    }))
}

#[test]
fn test_listener_isolation() {
    init_tracing();
    let item = DataItem::new(ItemDescriptor::new("valve.open", ItemKind::WriteOnly));
    let seen = Arc::new(Mutex::new(Vec::new()));
    for _ in 0..2 {
        item.add_command_listener(collecting(&seen)).unwrap();
    }
    item.add_command_listener(Arc::new(FnCommandListener::new(
        "broken",
        |_: &Variant| -> ng_da_sdk::DaResult<()> { panic!("driver offline") },
    )))
    .unwrap();
    item.add_command_listener(collecting(&seen)).unwrap();

    let report = item.set_value(Variant::Boolean(true)).unwrap();
    assert_eq!(report.delivered, 3);
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(
        report.failures[0].error,
        DaError::ListenerFailure { .. }
    ));
    assert_eq!(seen.lock().unwrap().len(), 3);
    assert_eq!(item.metrics().snapshot().listener_failures, 1);
}

#[test]
fn test_contract_violations_fail_before_dispatch() {
    let item = DataItem::new(
        ItemDescriptor::new("sp", ItemKind::WriteOnly).with_declared_type(Some(VariantType::Int32)),
    );
    let seen = Arc::new(Mutex::new(Vec::new()));
    item.add_command_listener(collecting(&seen)).unwrap();

    assert_eq!(item.set_value(Variant::Null), Err(DaError::NullValue));
    assert!(matches!(
        item.set_value(Variant::Int64(i64::MAX)),
        Err(DaError::NotConvertible(_))
    ));
    assert!(seen.lock().unwrap().is_empty());

    item.set_value(Variant::from("42")).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![Variant::Int32(42)]);
}

#[test]
fn test_read_only_item_rejects_write() {
    let item = DataItem::new(ItemDescriptor::new("pv", ItemKind::ReadOnly));
    assert!(matches!(
        item.set_value(Variant::Int32(1)),
        Err(DaError::InvalidOperation(_))
    ));
    assert!(item
        .add_command_listener(collecting(&Arc::new(Mutex::new(Vec::new()))))
        .is_err());
}

#[test]
fn test_command_item_is_stateless() {
    let item = DataItem::new(ItemDescriptor::new("reload", ItemKind::Command).with_accept_null(true));
    let seen = Arc::new(Mutex::new(Vec::new()));
    item.add_command_listener(collecting(&seen)).unwrap();

    item.set_value(Variant::Null).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![Variant::Null]);
    assert!(item.get_attributes().is_empty());

    let mut writes = AttributeMap::new();
    writes.insert("a".into(), Variant::Int32(1));
    writes.insert("b".into(), Variant::Int32(2));
    let results = item.set_attributes(&writes);
    assert_eq!(results.len(), 2);
    assert!(results.values().all(|r| matches!(r, Err(DaError::InvalidOperation(_)))));
}

#[test]
fn test_write_back_chain_transforms_outgoing_value() {
    let item = DataItem::new(ItemDescriptor::new("motor.speed", ItemKind::Chained));
    item.add_chain_entry(IODirections::INPUT, Arc::new(Scale::new(10.0, 0.0)))
        .unwrap();
    item.add_chain_entry(IODirections::OUTPUT, Arc::new(Negate))
        .unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    item.add_command_listener(collecting(&seen)).unwrap();

    item.update_value(Variant::Int32(3)).unwrap();
    item.set_value(Variant::Int32(5)).unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![Variant::Int32(-5)]);
    // the write path never touches published state
    assert_eq!(item.get_value().unwrap(), Variant::Double(30.0));
}

#[test]
fn test_dispatch_uses_snapshot_taken_at_start() {
    let item = Arc::new(DataItem::new(ItemDescriptor::new("cmd", ItemKind::Command).with_accept_null(true)));
    let entered = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));
    let late_calls = Arc::new(AtomicUsize::new(0));

    {
        let entered = Arc::clone(&entered);
        let release = Arc::clone(&release);
        item.add_command_listener(Arc::new(FnCommandListener::new("slow", move |_: &Variant| {
            entered.wait();
            release.wait();
            Ok(())
        })))
        .unwrap();
    }

    let dispatching = {
        let item = Arc::clone(&item);
        thread::spawn(move || item.set_value(Variant::Null).unwrap())
    };

    entered.wait();
    // registration does not wait for the running dispatch
    let calls = Arc::clone(&late_calls);
    item.add_command_listener(Arc::new(FnCommandListener::new("late", move |_: &Variant| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })))
    .unwrap();
    release.wait();

    let report = dispatching.join().unwrap();
    assert_eq!(report.attempted(), 1);
    assert_eq!(late_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_listener_registration_does_not_wait_for_delivery() {
    let item = Arc::new(DataItem::new(ItemDescriptor::new("pump.speed", ItemKind::Chained)));
    let entered = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));
    item.set_listener(Some(Arc::new(BlockingSink {
        entered: Arc::clone(&entered),
        release: Arc::clone(&release),
    })))
    .unwrap();

    let updating = {
        let item = Arc::clone(&item);
        thread::spawn(move || item.update_value(Variant::Int32(1)).unwrap())
    };
    // the sink now holds the item inside delivery
    entered.wait();

    let (done_tx, done_rx) = mpsc::channel();
    let registering = {
        let item = Arc::clone(&item);
        thread::spawn(move || {
            let added = item.add_command_listener(Arc::new(FnCommandListener::new(
                "late",
                |_: &Variant| Ok(()),
            )));
            let removed = added.as_ref().map(|id| item.remove_command_listener(*id));
            let _ = done_tx.send((added.is_ok(), removed == Ok(true)));
        })
    };
    let outcome = done_rx.recv_timeout(Duration::from_secs(2));

    release.wait();
    updating.join().unwrap();
    registering.join().unwrap();
    assert_eq!(outcome, Ok((true, true)));
}

#[test]
fn test_deactivated_item_refuses_command_listeners() {
    let item = DataItem::new(ItemDescriptor::new("valve", ItemKind::WriteOnly));
    let seen = Arc::new(Mutex::new(Vec::new()));
    item.add_command_listener(collecting(&seen)).unwrap();
    item.deactivate();

    assert!(matches!(
        item.add_command_listener(collecting(&seen)),
        Err(DaError::InvalidOperation(_))
    ));
    assert!(item.dispatcher().is_empty());
}
