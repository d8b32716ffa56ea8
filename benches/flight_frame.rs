//! Per-frame cost of the flight driver and a full texture rebuild.
//! Run: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lithos::config::SceneConfig;
use lithos::flight::FlightDriver;
use lithos::fracture::CeilingFracture;
use lithos::session::Session;
use lithos::texture::LayoutOnlyBuilder;

fn bench_flight_tick(c: &mut Criterion) {
    let config = SceneConfig::default();
    let geometry = config.flight_geometry();
    let mut session = Session::new(config, LayoutOnlyBuilder).expect("create session");
    session.submit_uncapped(&"THE QUICK BROWN FOX JUMPS OVER THE LAZY DOG".repeat(20));

    let mut group = c.benchmark_group("flight_frame");
    group.sample_size(50);

    group.bench_function("tick_700_letters_mid_flight", |b| {
        b.iter(|| {
            let mut driver = FlightDriver::new();
            black_box(driver.tick(session.store_mut(), &geometry, black_box(2.0)))
        });
    });

    group.bench_function("rebuild_all_layouts", |b| {
        b.iter(|| black_box(session.resize(1.0).expect("resize")));
    });

    group.finish();
}

fn bench_fracture_click(c: &mut Criterion) {
    let layout = SceneConfig::default().fracture;
    c.bench_function("fracture_click_and_settle", |b| {
        b.iter(|| {
            let mut fracture = CeilingFracture::new(800, 600, &layout, 7);
            fracture.click(400.0, 100.0);
            for _ in 0..60 {
                fracture.step();
            }
            black_box(fracture.debris().len())
        });
    });
}

criterion_group!(benches, bench_flight_tick, bench_fracture_click);
criterion_main!(benches);
