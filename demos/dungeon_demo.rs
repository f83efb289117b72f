//! Complete workflow demonstration for voronoi_dungeon_terrain
//!
//! Run with `RUST_LOG=debug` to see the generation phases.

use voronoi_dungeon_terrain::*;

fn main() -> Result<()> {
    env_logger::init();

    println!("=== voronoi_dungeon_terrain Demo ===\n");

    // Step 1: Configure terrain
    println!("Step 1: Configuring terrain...");
    let config = TerrainConfigBuilder::new()
        .seed(12345)
        .dimensions(64, 64)?
        .amplitude(6.0)?
        .rooms(30, 9)?
        .loop_factor(0.25)?
        .corridor_width(2)?
        .build()?;

    println!("  Seed: {}", config.seed);
    println!("  Grid: {}x{} ({} triangles)", config.width, config.height, config.triangle_count());
    println!("  Sites: {} -> rooms: {}", config.site_count, config.room_count);

    // Step 2: Synthesize heights
    println!("\nStep 2: Synthesizing heights...");
    let mut device = HeadlessDevice::new();
    let mut terrain = Terrain::with_config(&mut device, config)?;
    terrain.noise_height_map(&mut device)?;
    terrain.smoothen_height_map(&mut device, 0.5)?;

    let heights: Vec<f32> = terrain.vertices().iter().map(|v| v.position[1]).collect();
    let min = heights.iter().copied().fold(f32::INFINITY, f32::min);
    let max = heights.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    println!("  Height range: {:.2} .. {:.2}", min, max);

    // Step 3: Carve the dungeon
    println!("\nStep 3: Carving dungeon...");
    terrain.voronoi_dungeon(&mut device)?;
    for room in terrain.rooms() {
        println!(
            "  Room {}: anchor ({}, {}), {} sites, {} cells, height {:.2}",
            room.id,
            room.center.0,
            room.center.1,
            room.sites.len(),
            room.cell_count(),
            room.height
        );
    }
    println!("  {} corridors", terrain.corridors().len());

    // Step 4: Query the surface
    println!("\nStep 4: Height queries:");
    for &(x, z) in &[(10.0, 10.0), (31.5, 31.5), (50.25, 12.75), (-3.0, 5.0)] {
        match terrain.height_at(x, z) {
            Some(sample) => println!(
                "  ({:>6.2}, {:>6.2}) -> height {:.2}, walkability {:.2} ({})",
                x,
                z,
                sample.height,
                sample.walkability,
                if sample.walkable { "walkable" } else { "blocked" }
            ),
            None => println!("  ({:>6.2}, {:>6.2}) -> no terrain", x, z),
        }
    }

    #[cfg(feature = "spatial-index")]
    if let Some(site) = terrain.find_site_at(31.5, 31.5) {
        println!("  Nearest site to centre: {} (room {})", site, terrain.sites()[site].region);
    }

    // Step 5: Render through the headless context
    println!("\nStep 5: Rendering...");
    let mut ctx = HeadlessContext::new();
    let draws = terrain.render_quadtree(&mut ctx);
    println!("  {} quadtree draws, {} indices", draws, ctx.indices_drawn());
    println!("  {} buffers allocated, {} bytes", device.allocations(), device.bytes_allocated());

    terrain.shutdown();
    println!("\nDone.");
    Ok(())
}
