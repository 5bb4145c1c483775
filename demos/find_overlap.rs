//! Find where two recordings of the same path overlap.
//!
//! Run with: cargo run --example find_overlap

use track_overlap::geo_utils::{latitude_at_distance, longitude_at_distance};
use track_overlap::{OverlapConfig, Track, TrackPoint, SHARED_BIN_CACHE};

/// `count` points heading north-east from `start`, `step` meters apart.
fn course(start: (f64, f64), count: usize, step: f64) -> Vec<TrackPoint> {
    let mut points = vec![TrackPoint::new(start.0, start.1)];
    for _ in 1..count {
        let previous = points.last().unwrap().position();
        let component = step / 2.0_f64.sqrt();
        points.push(TrackPoint::new(
            latitude_at_distance(&previous, component, true),
            longitude_at_distance(&previous, component, true),
        ));
    }
    points
}

fn print_matches(matches: &[(Track, f64, bool)]) {
    if matches.is_empty() {
        println!("   No overlapping section found\n");
        return;
    }
    for (track, overlap, inverse) in matches {
        println!(
            "   Overlap: {:.1}% | direction: {} | matched {:.0} m over {} points",
            overlap * 100.0,
            if *inverse { "reverse" } else { "forward" },
            track.total_distance(),
            track.segments[0].len(),
        );
    }
    println!();
}

fn main() {
    let config = OverlapConfig::default();
    println!("Track Overlap Examples\n");
    println!(
        "Config: {} m grid cells, {:.0}% acceptance threshold\n",
        config.grid_width,
        config.overlap_threshold * 100.0
    );

    // A ~1.5 km ride heading north-east, recorded every 30 m
    let ride_points = course((48.0, 7.85), 50, 30.0);
    let ride = Track::from_points(ride_points.clone()).with_name("morning ride");

    // The middle of the ride, ridden the other way
    let mut middle = ride.segments[0].slice(15, 34);
    middle.points.reverse();
    let return_leg = Track::from_segment(middle).with_name("evening return");

    println!("1. Same path, opposite direction (morning ride vs evening return):");
    let matches = ride
        .find_overlap_with(0, &return_leg, 0, &config, &SHARED_BIN_CACHE)
        .unwrap();
    print_matches(&matches);

    // A second device logged the same stretch, but only once every 120 m;
    // the pipeline resamples it below the grid width before comparing
    let sparse_points: Vec<TrackPoint> = ride_points[10..=38].iter().step_by(4).cloned().collect();
    let sparse = Track::from_points(sparse_points).with_name("sparse recording");

    println!("2. Same path, sparse sampling (morning ride vs sparse recording):");
    let matches = ride
        .find_overlap_with(0, &sparse, 0, &config, &SHARED_BIN_CACHE)
        .unwrap();
    print_matches(&matches);

    // A ride in a different valley
    let elsewhere = Track::from_points(course((48.3, 7.85), 20, 30.0)).with_name("other valley");

    println!("3. Different locations (morning ride vs other valley):");
    let matches = ride
        .find_overlap_with(0, &elsewhere, 0, &config, &SHARED_BIN_CACHE)
        .unwrap();
    print_matches(&matches);

    // An out-and-back ride passes the matched stretch twice; each pass is
    // reported on its own, with its own direction
    let mut out_and_back_points = ride_points.clone();
    out_and_back_points.extend(ride_points.iter().rev().skip(1).cloned());
    let out_and_back = Track::from_points(out_and_back_points).with_name("out and back");
    let stretch = Track::from_segment(ride.segments[0].slice(15, 34)).with_name("the stretch");

    println!("4. Out-and-back ride vs one stretch of it:");
    let matches = out_and_back
        .find_overlap_with(0, &stretch, 0, &config, &SHARED_BIN_CACHE)
        .unwrap();
    print_matches(&matches);

    println!(
        "Bin cache holds {} ladder pair(s) after all comparisons",
        SHARED_BIN_CACHE.len()
    );
}
