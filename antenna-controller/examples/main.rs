use antenna_controller::{AntennaController, CarryoutController, LinkSettings, PositionReading};
use std::time::Duration;

/*
 * Points a Carryout dish once and prints what it reported.
 *
 * cargo run -p antenna-controller --example main -- /dev/ttyUSB0 180 45
 */

fn main() {
    let mut args = std::env::args().skip(1);
    let port = args.next().unwrap_or_else(|| "/dev/ttyUSB0".to_string());
    let azimuth: f64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(180.0);
    let elevation: f64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(45.0);

    let controller =
        CarryoutController::open(&port, 57600, Duration::from_secs(1), LinkSettings::default())
            .expect("Failed to open serial port");

    let target = PositionReading::new(azimuth, elevation).expect("Invalid target");

    match controller.move_to(target) {
        Ok(position) => println!("Dish reported {position}"),
        Err(e) => println!("Move failed: {e}"),
    }

    println!("{:#?}", controller.current_status());

    controller.stop().expect("Failed to stop antenna");
}
