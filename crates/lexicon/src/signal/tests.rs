use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use super::*;

fn recorder<T: Clone + Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl Fn(T) + Send + Sync + 'static) {
	let seen = Arc::new(Mutex::new(Vec::new()));
	let sink = {
		let seen = Arc::clone(&seen);
		move |value: T| seen.lock().push(value)
	};
	(seen, sink)
}

fn publisher_of<T: Copy + Send + 'static>(broadcast: &Broadcast<T>) -> Publisher<T> {
	let broadcast = broadcast.clone();
	Publisher::new(move |sink: Sink<T>| broadcast.subscribe(move |v| sink(*v)))
}

#[test]
fn test_send_reaches_listeners_in_subscription_order() {
	let broadcast = Broadcast::<u32>::new();
	let order = Arc::new(Mutex::new(Vec::new()));

	let subscriptions: Vec<_> = (0..3)
		.map(|i| {
			let order = Arc::clone(&order);
			broadcast.subscribe(move |value| order.lock().push((i, *value)))
		})
		.collect();

	broadcast.send(&7);
	assert_eq!(*order.lock(), vec![(0, 7), (1, 7), (2, 7)]);
	drop(subscriptions);
}

#[test]
fn test_order_survives_cancellation() {
	let broadcast = Broadcast::<u32>::new();
	let order = Arc::new(Mutex::new(Vec::new()));
	let listen = |i: u32| {
		let order = Arc::clone(&order);
		broadcast.subscribe(move |_| order.lock().push(i))
	};

	let first = listen(1);
	let second = listen(2);
	first.cancel();
	let third = listen(3);

	broadcast.send(&0);
	assert_eq!(*order.lock(), vec![2, 3]);
	drop((second, third));
}

#[test]
fn test_cancel_and_drop_stop_delivery() {
	let broadcast = Broadcast::<u32>::new();
	let (seen, sink) = recorder();
	let subscription = broadcast.subscribe(move |v| sink(*v));

	broadcast.send(&1);
	subscription.cancel();
	broadcast.send(&2);
	assert_eq!(*seen.lock(), vec![1]);
	assert!(broadcast.is_empty());

	let (seen, sink) = recorder();
	{
		let _subscription = broadcast.subscribe(move |v| sink(*v));
		broadcast.send(&3);
	}
	broadcast.send(&4);
	assert_eq!(*seen.lock(), vec![3]);
}

#[test]
fn test_detach_keeps_listening() {
	let broadcast = Broadcast::<u32>::new();
	let (seen, sink) = recorder();
	broadcast.subscribe(move |v| sink(*v)).detach();

	broadcast.send(&5);
	assert_eq!(*seen.lock(), vec![5]);
	assert_eq!(broadcast.len(), 1);
}

#[test]
fn test_listener_may_send_reentrantly() {
	let broadcast = Broadcast::<u32>::new();
	let (seen, sink) = recorder();

	let echo = {
		let inner = broadcast.clone();
		broadcast.subscribe(move |v| {
			if *v == 1 {
				inner.send(&2);
			}
		})
	};
	let record = broadcast.subscribe(move |v| sink(*v));

	broadcast.send(&1);
	assert_eq!(*seen.lock(), vec![2, 1]);
	drop((echo, record));
}

#[test]
fn test_listener_cancelled_mid_send_is_skipped() {
	let broadcast = Broadcast::<u32>::new();
	let (seen, sink) = recorder();
	let victim: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

	let killer = {
		let victim = Arc::clone(&victim);
		broadcast.subscribe(move |_| {
			let taken = victim.lock().take();
			drop(taken);
		})
	};
	*victim.lock() = Some(broadcast.subscribe(move |v| sink(*v)));

	broadcast.send(&1);
	assert!(seen.lock().is_empty());
	drop(killer);
}

#[test]
fn test_publisher_map_and_filter() {
	let broadcast = Broadcast::<u32>::new();
	let source = publisher_of(&broadcast);

	let (seen, sink) = recorder();
	let subscription = source.filter(|v| v % 2 == 0).map(|v| v * 10).sink(sink);

	for i in 0..5 {
		broadcast.send(&i);
	}
	assert_eq!(*seen.lock(), vec![0, 20, 40]);
	drop(subscription);
}

#[test]
fn test_publisher_is_cold() {
	let publisher = Publisher::just("hello".to_owned());
	assert_eq!(publisher.first().as_deref(), Some("hello"));
	assert_eq!(publisher.first().as_deref(), Some("hello"));
	assert_eq!(Publisher::<u32>::empty().first(), None);
}

#[test]
fn test_dedup_drops_repeats() {
	let broadcast = Broadcast::<u32>::new();
	let source = publisher_of(&broadcast);
	let (seen, sink) = recorder();
	let subscription = source.dedup().sink(sink);

	for v in [1, 1, 2, 2, 1] {
		broadcast.send(&v);
	}
	assert_eq!(*seen.lock(), vec![1, 2, 1]);
	drop(subscription);
}

#[test]
fn test_switch_map_follows_latest() {
	let selector = Broadcast::<usize>::new();
	let sources = [Broadcast::<u32>::new(), Broadcast::<u32>::new()];

	let publisher = {
		let sources = sources.clone();
		publisher_of(&selector).switch_map(move |i| publisher_of(&sources[i]))
	};

	let (seen, sink) = recorder();
	let subscription = publisher.sink(sink);

	selector.send(&0);
	sources[0].send(&1);
	sources[1].send(&2);
	selector.send(&1);
	sources[0].send(&3);
	sources[1].send(&4);

	assert_eq!(*seen.lock(), vec![1, 4]);
	assert!(sources[0].is_empty());

	drop(subscription);
	assert!(sources[1].is_empty());
	assert!(selector.is_empty());
}

#[test]
fn test_combine_latest_waits_for_all() {
	let a = Broadcast::<u32>::new();
	let b = Broadcast::<u32>::new();
	let (seen, sink) = recorder();
	let subscription = Publisher::combine_latest(vec![publisher_of(&a), publisher_of(&b)]).sink(sink);

	a.send(&1);
	assert!(seen.lock().is_empty());
	b.send(&2);
	a.send(&3);
	assert_eq!(*seen.lock(), vec![vec![1, 2], vec![3, 2]]);
	drop(subscription);
}

#[tokio::test]
async fn test_stream_receives_and_times_out() {
	let broadcast = Broadcast::<u32>::new();
	let mut stream = publisher_of(&broadcast).stream();
	broadcast.send(&9);
	assert_eq!(stream.next_within(Duration::from_millis(50)).await, Ok(9));
	assert_eq!(stream.next_within(Duration::from_millis(10)).await, Err(WaitError::Timeout));

	stream.close();
	assert!(broadcast.is_empty());
	assert_eq!(stream.next().await, None);
}
