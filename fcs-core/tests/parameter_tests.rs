use std::{sync::Arc, thread};

use fcs_core::utils::parameters::{
    list_parameters, set_parameter, GatewayError, Parameter, ParameterStore, ParameterType,
    ParameterValue, SharedParameters,
};

/// Store wrapper that counts lookups.
struct CountingStore {
    inner: SharedParameters,
    lookups: std::cell::Cell<usize>,
}

impl ParameterStore for CountingStore {
    fn with_entry<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut Parameter) -> R,
    ) -> Option<R> {
        self.lookups.set(self.lookups.get() + 1);
        self.inner.with_entry(name, f)
    }

    fn for_each(
        &self,
        f: impl FnMut(&Parameter),
    ) {
        self.inner.for_each(f)
    }
}

fn seeded() -> SharedParameters {
    let store = SharedParameters::new();
    store
        .declare("/attitude/kp", ParameterValue::Scalar(0.5))
        .unwrap();
    store
        .declare("/imu/rate_hz", ParameterValue::Integer(1000))
        .unwrap();
    store
        .declare("/logging/enabled", ParameterValue::Boolean(true))
        .unwrap();
    store
        .declare("/board/name", ParameterValue::String("fc-rev2".into()))
        .unwrap();
    store
        .declare("/mag/offset", ParameterValue::Vector(vec![0.1, -0.25, 3.0]))
        .unwrap();
    store
}

fn listing(store: &SharedParameters) -> String {
    let mut out = String::new();
    list_parameters(store, &mut out).unwrap();
    out
}

#[test]
fn set_overwrites_a_scalar_in_place() {
    let store = seeded();
    set_parameter(&store, &["/attitude/kp", "3.25"]).unwrap();
    assert_eq!(store.get("/attitude/kp"), Some(ParameterValue::Scalar(3.25)));
    assert!(store.take_changed("/attitude/kp"));
}

#[test]
fn set_on_missing_parameter_is_not_found() {
    let store = seeded();
    let before = listing(&store);
    assert_eq!(
        set_parameter(&store, &["missing", "1.0"]),
        Err(GatewayError::NotFound)
    );
    assert_eq!(listing(&store), before);
}

#[test]
fn set_on_non_scalar_is_rejected_for_every_kind() {
    let store = seeded();
    let before = listing(&store);
    for (name, kind) in [
        ("/imu/rate_hz", ParameterType::Integer),
        ("/logging/enabled", ParameterType::Boolean),
        ("/board/name", ParameterType::String),
        ("/mag/offset", ParameterType::Vector),
    ] {
        assert_eq!(
            set_parameter(&store, &[name, "1.0"]),
            Err(GatewayError::UnsupportedType(kind))
        );
        assert!(!store.take_changed(name));
    }
    assert_eq!(listing(&store), before);
}

#[test]
fn wrong_argument_count_is_a_usage_error_without_lookup() {
    let store = CountingStore {
        inner: seeded(),
        lookups: Default::default(),
    };
    assert_eq!(set_parameter(&store, &["/attitude/kp"]), Err(GatewayError::Usage));
    assert_eq!(set_parameter(&store, &[]), Err(GatewayError::Usage));
    assert_eq!(
        set_parameter(&store, &["/attitude/kp", "1", "2"]),
        Err(GatewayError::Usage)
    );
    assert_eq!(store.lookups.get(), 0);
    assert_eq!(
        store.inner.get("/attitude/kp"),
        Some(ParameterValue::Scalar(0.5))
    );
}

#[test]
fn malformed_value_is_rejected_and_store_unchanged() {
    let store = seeded();
    assert_eq!(
        set_parameter(&store, &["/attitude/kp", "fast"]),
        Err(GatewayError::InvalidValue("fast".into()))
    );
    assert_eq!(store.get("/attitude/kp"), Some(ParameterValue::Scalar(0.5)));
    assert!(!store.take_changed("/attitude/kp"));
}

#[test]
fn values_are_parsed_between_classify_and_write() {
    let store = CountingStore {
        inner: seeded(),
        lookups: Default::default(),
    };
    assert_eq!(
        set_parameter(&store, &["/attitude/kp", "fast"]),
        Err(GatewayError::InvalidValue("fast".into()))
    );
    // classified once, never written
    assert_eq!(store.lookups.get(), 1);
    assert!(!store.inner.take_changed("/attitude/kp"));

    assert_eq!(
        set_parameter(&store, &["/imu/rate_hz", "fast"]),
        Err(GatewayError::UnsupportedType(ParameterType::Integer))
    );
    assert_eq!(store.lookups.get(), 2);

    set_parameter(&store, &["/attitude/kp", "0.75"]).unwrap();
    assert_eq!(store.lookups.get(), 4);
    assert_eq!(
        store.inner.get("/attitude/kp"),
        Some(ParameterValue::Scalar(0.75))
    );
}

#[test]
fn gateway_errors_render_as_shell_messages() {
    assert_eq!(
        GatewayError::Usage.to_string(),
        "usage: parameter_set name value"
    );
    assert_eq!(GatewayError::NotFound.to_string(), "parameter doesn't exist");
    assert_eq!(
        GatewayError::UnsupportedType(ParameterType::Integer).to_string(),
        "unsupported type integer"
    );
}

#[test]
fn empty_store_lists_nothing() {
    assert_eq!(listing(&SharedParameters::new()), "");
}

#[test]
fn listing_has_one_line_per_entry_in_store_order() {
    let store = seeded();
    assert_eq!(
        listing(&store),
        "/attitude/kp: 0.5\n\
         /imu/rate_hz: 1000\n\
         /logging/enabled: true\n\
         /board/name: \"fc-rev2\"\n\
         /mag/offset: [0.1, -0.25, 3]\n"
    );
}

#[test]
fn concurrent_writers_leave_one_of_their_values() {
    let store = Arc::new(seeded());
    let writers: Vec<_> = ["1.5", "2.5", "3.5", "4.5"]
        .into_iter()
        .map(|value| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..100 {
                    set_parameter(&*store, &["/attitude/kp", value]).unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let Some(ParameterValue::Scalar(v)) = store.get("/attitude/kp") else {
        panic!("scalar expected");
    };
    assert!([1.5, 2.5, 3.5, 4.5].contains(&v));
}
