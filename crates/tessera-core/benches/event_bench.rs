use std::hint::black_box;
use std::rc::Rc;

use criterion::{criterion_group, criterion_main, Criterion};
use tessera_core::{ErrorSink, Event, EventRecursion};

type Tick = Rc<dyn Fn(u64) -> u64>;

fn bench_emit(c: &mut Criterion) {
    let event: Event<Tick> = Event::with_config(true, ErrorSink::log_only(), EventRecursion::Disallow);
    for i in 0..1_000u64 {
        event.bind(Rc::new(move |x| x.wrapping_add(i)), (i % 7) as i32).unwrap();
    }

    let mut group = c.benchmark_group("Event");

    group.bench_function("Emit to 1000 subscribers", |b| {
        b.iter(|| {
            let mut acc = 0u64;
            event
                .emit(|tick| {
                    acc = tick(acc);
                    true
                })
                .unwrap();
            black_box(acc);
        });
    });

    group.bench_function("Bind then unbind", |b| {
        b.iter(|| {
            let hook = event.bind(Rc::new(|x| x), 3).unwrap();
            hook.unbind();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_emit);
criterion_main!(benches);
