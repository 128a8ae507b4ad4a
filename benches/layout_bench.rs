// Benchmark for the day grid layout
// Measures grouping and full layout on busy clinic days

use chrono::{NaiveDate, NaiveTime};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use physio_schedule::models::appointment::Appointment;
use physio_schedule::models::tenant::TenantId;
use physio_schedule::services::layout::{group_overlaps, layout_appointments, GridConfig};

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 8).unwrap()
}

/// `count` appointments spread over 07:00-19:00 with a fixed stride, so
/// sessions pile up into overlapping chains.
fn busy_day(count: usize) -> Vec<Appointment> {
    let tenant = TenantId::new("clinic-a").unwrap();
    let opening = NaiveTime::from_hms_opt(7, 0, 0).unwrap();

    (0..count)
        .map(|i| {
            let offset = (i * 37 % 690) as i64;
            let minutes = 30 + (i * 13 % 60) as u32;
            Appointment::new(
                format!("apt-{}", i),
                tenant.clone(),
                format!("patient-{}", i),
                day(),
                opening + chrono::Duration::minutes(offset),
                minutes,
            )
            .unwrap()
        })
        .collect()
}

fn bench_group_overlaps(c: &mut Criterion) {
    let mut group = c.benchmark_group("group_overlaps");

    for count in [20usize, 100, 500] {
        let appointments = busy_day(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &appointments, |b, appointments| {
            b.iter(|| group_overlaps(black_box(appointments), day()))
        });
    }

    group.finish();
}

fn bench_layout_day(c: &mut Criterion) {
    let appointments = busy_day(100);
    let config = GridConfig::default().with_multiplier(1.5);

    c.bench_function("layout_appointments_100", |b| {
        b.iter(|| layout_appointments(black_box(&appointments), day(), black_box(&config)))
    });
}

criterion_group!(benches, bench_group_overlaps, bench_layout_day);
criterion_main!(benches);
