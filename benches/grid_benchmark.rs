use chrono::NaiveDate;
use court_finder::aggregate::{build_grid, summarize, FacilityAvailability};
use court_finder::portal::{AvailabilityPayload, BookingGroup, DaySlotGroup, Facility, Spot};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{thread_rng, Rng};

const DAY_MS: i64 = 86_400_000;
// 2025-06-09 12:00 UTC
const FIRST_DAY_MS: i64 = 1_749_470_400_000;

fn random_results(facilities: usize, days: u32) -> Vec<FacilityAvailability> {
    let mut rng = thread_rng();
    (0..facilities)
        .map(|f| {
            let availabilities = (0..days)
                .map(|d| {
                    let spots = (0..rng.gen_range(0..12))
                        .map(|_| {
                            let spot = Spot::new(
                                rng.gen_range(6..23),
                                if rng.gen_bool(0.5) { 0 } else { 30 },
                                [0.5, 1.0, 1.5, 2.0][rng.gen_range(0..4)],
                            );
                            if rng.gen_bool(0.2) {
                                spot.disabled()
                            } else {
                                spot
                            }
                        })
                        .collect();
                    DaySlotGroup {
                        date: format!("/Date({})/", FIRST_DAY_MS + d as i64 * DAY_MS),
                        booking_groups: vec![BookingGroup {
                            available_spots: spots,
                        }],
                    }
                })
                .collect();
            FacilityAvailability::new(
                Facility::new(format!("f-{}", f), format!("Court {}", f)),
                Some(AvailabilityPayload { availabilities }),
            )
        })
        .collect()
}

pub fn aggregation_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("availability_aggregation");
    let start = NaiveDate::from_ymd_opt(2025, 6, 9).unwrap();

    for facilities in [4, 16, 64].iter() {
        let results = random_results(*facilities, 7);

        group.bench_with_input(
            BenchmarkId::new("build_grid", facilities),
            &results,
            |b, results| b.iter(|| build_grid(black_box(results), start, 7)),
        );
        group.bench_with_input(
            BenchmarkId::new("summarize", facilities),
            &results,
            |b, results| b.iter(|| summarize(black_box(results))),
        );
    }

    group.finish();
}

criterion_group!(benches, aggregation_benchmark);
criterion_main!(benches);
