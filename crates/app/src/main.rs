//! Headless corridor driver.
//!
//! Builds a canonical synthetic corridor (one highway spine, two staging
//! lots, one industrial park, one export gate), runs it for a requested
//! number of simulated hours at 60 fps frame pacing, and prints a metrics
//! table. Usage:
//!
//! ```text
//! corridor [SIM_HOURS] [SEED]
//! ```

use simulation::sim_clock::SpeedPreset;
use simulation::test_harness::TestCorridor;

fn build(seed: u64) -> TestCorridor {
    TestCorridor::new(96, 100.0)
        .with_seed(seed)
        // Highway spine with the gate at the west end.
        .with_highway(2, 48, 93, 48)
        .with_gate(2, 48)
        // City connector feeding the spine mid-corridor.
        .with_city_street(60, 30, 60, 48)
        .with_city_street(60, 30, 93, 30)
        // Two staging lots off short spurs.
        .with_highway(30, 44, 30, 48)
        .with_lot(1, 27, 40, 32, 43)
        .with_highway(70, 44, 70, 48)
        .with_lot(2, 68, 40, 73, 43)
        // One industrial park flush against the spine.
        .with_park(10, 84, 44, 88, 47)
        // Sources: a border crossing far east plus the park's output.
        .with_source(1, 93, 48, 2.0)
        .with_source(2, 93, 30, 1.0)
        .with_park_source(3, 86, 48, 1.0, 10)
        .with_flat_scenario(120_000.0, 400_000.0)
        .attach()
}

fn print_metrics(corridor: &TestCorridor) {
    let stats = corridor.stats();
    let clock = corridor.clock();
    println!();
    println!("sim time            {:>12.1} h", clock.sim_time_s / 3_600.0);
    println!("injected            {:>12.0} kg", stats.injected_total_kg);
    println!("  restricted        {:>12.0} kg", stats.injected_restricted_kg);
    println!("  cleared           {:>12.0} kg", stats.injected_cleared_kg);
    println!("converted           {:>12.0} kg", stats.converted_total_kg);
    println!("exported            {:>12.0} kg", stats.drained_total_kg);
    println!("in transit          {:>12.0} kg", stats.total_kg);
    println!("  on-road restricted{:>12.0} kg", stats.restricted_kg);
    println!("  roadside staging  {:>12.0} kg", stats.staging_kg);
    println!("  stored in lots    {:>12.0} kg", stats.lot_stored_kg);
    println!("  waiting in parks  {:>12.0} kg", stats.park_wait_kg);
    println!("  on-road cleared   {:>12.0} kg", stats.cleared_kg);
    println!("gate backlog        {:>12.0} kg", stats.backlog_near_gate_kg);
    println!("inflow rate         {:>12.0} kg/h", stats.inflow_kg_per_hr);
    println!("throughput          {:>12.0} kg/h", stats.throughput_kg_per_hr);
    println!("conversion rate     {:>12.0} kg/h", stats.conversion_kg_per_hr);
    println!("trucks on screen    {:>12}", corridor.fleet().alive_count());
    println!("queue depth         {:>12}", corridor.queue().queued_len());
    println!("invariant issues    {:>12}", corridor.violations().total());
}

fn main() {
    let mut args = std::env::args().skip(1);
    let hours: f64 = args
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(6.0);
    let seed: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(42);

    println!("corridor: {hours} simulated hours, seed {seed}");
    let mut corridor = build(seed);
    corridor.clock_mut().set_preset(SpeedPreset::Octuple);

    let mut next_report_h = 1.0;
    while corridor.clock().sim_time_s < hours * 3_600.0 {
        corridor.tick();
        let elapsed_h = corridor.clock().sim_time_s / 3_600.0;
        if elapsed_h >= next_report_h {
            println!(
                "t={elapsed_h:>6.1} h  injected {:>10.0} kg  exported {:>10.0} kg  trucks {:>5}",
                corridor.stats().injected_total_kg,
                corridor.stats().drained_total_kg,
                corridor.fleet().alive_count()
            );
            next_report_h += 1.0;
        }
    }
    print_metrics(&corridor);
}
