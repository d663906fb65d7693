//! Property-based tests for aster-core.
//!
//! Binding validation, statistics bounds, zero-copy visibility, and router
//! determinism over randomized shapes and inputs.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use aster_core::{
    Buffer, Condition, ConditionPredicate, DataType, EvaluationError, Module, Predicate, RouteSet,
    Router, Task, TaskError, Verdict, predicate_fn,
};
use proptest::prelude::*;

const TYPES: [DataType; 10] = [
    DataType::I8,
    DataType::I16,
    DataType::I32,
    DataType::I64,
    DataType::U8,
    DataType::U16,
    DataType::U32,
    DataType::U64,
    DataType::F32,
    DataType::F64,
];

fn data_type() -> impl Strategy<Value = DataType> {
    (0..TYPES.len()).prop_map(|i| TYPES[i])
}

fn output_task(module: &Module, len: usize, data_type: DataType) -> Task {
    let mut b = module.task_builder("out");
    b.create_socket_out("out", len, data_type).unwrap();
    b.build()
}

fn input_task(module: &Module, len: usize, data_type: DataType) -> Task {
    let mut b = module.task_builder("in");
    b.create_socket_in("in", len, data_type).unwrap();
    b.create_codelet(|_, _| Ok(0)).unwrap();
    b.build()
}

/// Predicate selecting a route from the first element, modulo the route count.
fn first_element_mod(n_routes: usize) -> impl Predicate {
    predicate_fn(move |input: &Buffer| {
        let first = input
            .value_f64(0)
            .ok_or_else(|| EvaluationError::new("empty input"))?;
        Ok(Verdict::Route(first.abs() as usize % n_routes))
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Binding succeeds exactly when type and length agree, and a rejected bind
    /// never changes the existing binding.
    #[test]
    fn bind_validation(
        len in 1usize..64,
        other_len in 1usize..64,
        ty in data_type(),
        other_ty in data_type(),
    ) {
        let m = Module::new("m");
        let current = output_task(&m, len, ty);
        let candidate = output_task(&m, other_len, other_ty);
        let mut consumer = input_task(&m, len, ty);
        consumer.bind(0, &current[0]).unwrap();

        let result = consumer.bind(0, &candidate[0]);
        if len == other_len && ty == other_ty {
            prop_assert!(result.is_ok());
            prop_assert_eq!(consumer[0].source().map(|o| o.task), Some(candidate.id()));
        } else {
            let is_type_mismatch = matches!(result, Err(TaskError::TypeMismatch { .. }));
            prop_assert!(is_type_mismatch);
            prop_assert_eq!(consumer[0].source().map(|o| o.task), Some(current.id()));
        }
    }

    /// After N successful calls with stats on, the counter is N, min/avg/max
    /// bound each other, and a sub-phase total is the exact sum of its updates.
    #[test]
    fn stats_after_n_calls(micros in prop::collection::vec(0u64..500, 1..40)) {
        let m = Module::new("m");
        let mut b = m.task_builder("work");
        let phase = b.register_timer("phase").unwrap();
        let updates = micros.clone();
        let call = Arc::new(Mutex::new(0usize));
        b.create_codelet(move |_, io| {
            let mut k = call.lock().unwrap();
            io.update_timer(phase, Duration::from_micros(updates[*k]))?;
            *k += 1;
            Ok(0)
        }).unwrap();
        let mut t = b.build();
        t.set_stats(true);

        for _ in 0..micros.len() {
            t.exec().unwrap();
        }
        prop_assert_eq!(t.n_calls() as usize, micros.len());
        prop_assert!(t.duration_min() <= t.duration_avg());
        prop_assert!(t.duration_avg() <= t.duration_max());
        prop_assert!(t.duration_max() <= t.duration_total());

        let timing = t.timers()[phase].timing();
        let expected: Duration = micros.iter().map(|&us| Duration::from_micros(us)).sum();
        prop_assert_eq!(timing.n_calls() as usize, micros.len());
        prop_assert_eq!(timing.total(), expected);
        prop_assert_eq!(timing.min(), Duration::from_micros(*micros.iter().min().unwrap()));
        prop_assert_eq!(timing.max(), Duration::from_micros(*micros.iter().max().unwrap()));
    }

    /// A zero-copy consumer reads whatever the producer buffer holds when it runs.
    #[test]
    fn zero_copy_sees_producer_writes(values in prop::collection::vec(any::<i32>(), 1..32)) {
        let m = Module::new("m");
        let idle = output_task(&m, values.len(), DataType::I32);
        let mut b = m.task_builder("peek");
        let input = b.create_socket_in("in", values.len(), DataType::I32).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in = seen.clone();
        b.create_codelet(move |_, io| {
            *seen_in.lock().unwrap() = io.input::<i32>(input)?.to_vec();
            Ok(0)
        }).unwrap();
        let mut consumer = b.build();
        consumer.set_autoalloc(false);

        let mut b = m.task_builder("fill");
        let out = b.create_socket_out("out", values.len(), DataType::I32).unwrap();
        let fill = values.clone();
        b.create_codelet(move |_, io| {
            io.output::<i32>(out)?.copy_from_slice(&fill);
            Ok(0)
        }).unwrap();
        let mut filler = b.build();
        consumer.bind(input, &filler[out]).unwrap();
        filler.exec().unwrap();
        prop_assert!(consumer.is_last_input_socket(input));
        filler[out].with_data_mut::<i32, _>(|d| d.reverse()).unwrap();

        consumer.exec().unwrap();
        let mut expected = values.clone();
        expected.reverse();
        prop_assert_eq!(&*seen.lock().unwrap(), &expected);

        // That producer never ran, so reading from it forces a copy.
        consumer.bind(input, &idle[0]).unwrap();
        idle[0].with_data_mut::<i32, _>(|d| d.fill(7)).unwrap();
        prop_assert!(!consumer.is_last_input_socket(input));
        consumer.exec().unwrap();
        prop_assert!(seen.lock().unwrap().iter().all(|&x| x == 7));
    }

    /// Repeated routing of the same input with the same predicate is stable and in range.
    #[test]
    fn route_is_deterministic(
        values in prop::collection::vec(-1000.0f64..1000.0, 1..16),
        n_routes in 1usize..8,
    ) {
        let m = Module::new("m");
        let r = Router::new(
            m.handle(),
            "r",
            DataType::F64,
            values.len(),
            n_routes,
            Arc::new(first_element_mod(n_routes)),
        ).unwrap();
        let input = Buffer::from_slice(&values);
        let first = r.route(&input).unwrap();
        prop_assert!(first < n_routes);
        for _ in 0..5 {
            prop_assert_eq!(r.route(&input).unwrap(), first);
        }
    }

    /// Without a predicate preference the lower route always wins a tie.
    #[test]
    fn tie_break_is_ascending(a in 0usize..64, b in 0usize..64) {
        let m = Module::new("m");
        let predicate = ConditionPredicate::new(vec![Condition::Always]);
        let r = Router::new(m.handle(), "r", DataType::U8, 1, 64, Arc::new(predicate)).unwrap();
        prop_assert_eq!(r.select_route_inter(a, b), a.min(b));
        prop_assert_eq!(r.select_route_inter(b, a), a.min(b));
    }

    /// Candidate sets resolve to their smallest member.
    #[test]
    fn candidates_resolve_to_smallest(routes in prop::collection::btree_set(0usize..16, 1..6)) {
        let m = Module::new("m");
        let set: RouteSet = routes.iter().copied().collect();
        let p = predicate_fn(move |_: &Buffer| Ok(Verdict::Candidates(set)));
        let r = Router::new(m.handle(), "r", DataType::U8, 1, 16, Arc::new(p)).unwrap();
        let smallest = *routes.iter().next().unwrap();
        prop_assert_eq!(r.route(&Buffer::zeroed(DataType::U8, 1)).unwrap(), smallest);
    }
}
