//! Example: query elevation from a tiled DEM archive.
//!
//! Usage: cargo run --example lookup_elevation -- <archive> <lat> <lon>
//!
//! `<archive>` may be a local .dtar file or an http(s) URL.

use demtiles::DemReader;
use std::env;
use std::time::Instant;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 4 {
        eprintln!("Usage: {} <archive> <lat> <lon>", args[0]);
        eprintln!(
            "Example: {} https://example.com/terrain.dtar 47.6062 -122.3321",
            args[0]
        );
        std::process::exit(1);
    }

    let archive = &args[1];
    let lat: f64 = args[2].parse().expect("Invalid latitude");
    let lon: f64 = args[3].parse().expect("Invalid longitude");

    let reader = if archive.starts_with("http://") || archive.starts_with("https://") {
        DemReader::from_url(archive)
    } else {
        DemReader::from_path(archive)
    }
    .expect("Failed to open archive");

    let info = reader.metadata().expect("Failed to load archive metadata");
    println!(
        "Archive: zoom {}-{}, {}px {:?} tiles",
        info.min_zoom, info.max_zoom, info.tile_size, info.tile_format
    );
    let [west, south, east, north] = info.bounds;
    println!(
        "Coverage: lat {:.2}° to {:.2}°, lon {:.2}° to {:.2}°",
        south, north, west, east
    );
    if let Ok(km) = reader.tile_size_km() {
        println!("Tile size on the ground: ~{:.2} km", km);
    }

    println!("\nQuerying elevation at ({}, {})...", lat, lon);
    let start = Instant::now();
    match reader.get_elevation(lat, lon) {
        Ok(Some(sample)) => {
            println!(
                "Elevation: {:.2} meters (rgb {:?}, tile z={} x={} y={}, fetched in {:.3}s)",
                sample.elevation,
                sample.rgb,
                sample.tile.z,
                sample.tile.x,
                sample.tile.y,
                start.elapsed().as_secs_f64()
            );
        }
        Ok(None) => println!("No elevation data at this coordinate."),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }

    // Second query hits the cache.
    let start = Instant::now();
    if let Ok(Some(sample)) = reader.get_elevation(lat, lon) {
        println!(
            "Elevation (cached): {:.2} meters in {:.6}s",
            sample.elevation,
            start.elapsed().as_secs_f64()
        );
    }
}
