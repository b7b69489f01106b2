//! Command line handling
//!
//! The dispatcher works on a plain `Cli` struct so it stays independent of
//! the argument-parsing backend in `clap_std`.

pub mod clap_std;

use std::fs;
use std::io::Write;
use std::sync::Arc;

use num_traits::FromPrimitive;

use crate::classify::{classify, DeviceClass};
use crate::product::{self, ProductClass};
use crate::sdk::sim::{SimContext, SimScenario};
use crate::sdk::{CameraInfo, DeviceContext};
use crate::store::{image_digest, FirmwareStore};
use crate::updater::{UpdateEvent, Updater};
use crate::usb;
use crate::version::{is_update_required, FirmwareVersion};
use crate::watcher::{WatchState, Watcher};

#[derive(Debug)]
pub struct LogLevel(pub log::LevelFilter);

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel(log::LevelFilter::Error)
    }
}

/// Shadows clap_std::ClapCli
#[derive(Debug, Default)]
pub struct Cli {
    pub verbosity: LogLevel,
    pub list: bool,
    pub usb_list: bool,
    pub info: bool,
    pub update: bool,
    pub recover: bool,
    pub watch: bool,
    pub serial: Option<String>,
    pub fw_file: Option<String>,
    pub product_class: Option<u8>,
    pub compare_version: Option<String>,
    pub scenario: Option<String>,
}

/// Parse a list of commandline arguments and return the struct
pub fn parse(args: &[String]) -> Cli {
    clap_std::parse(args)
}

/// Build the device context the commands run against. The native SDK
/// binding implements [`DeviceContext`] out of tree; in its absence a
/// simulated context backs the commands.
fn make_context(args: &Cli) -> Result<Arc<dyn DeviceContext>, String> {
    match &args.scenario {
        Some(path) => {
            let toml_str =
                fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path, e))?;
            let scenario = SimScenario::from_toml(&toml_str)
                .map_err(|e| format!("Failed to parse {}: {}", path, e))?;
            Ok(Arc::new(SimContext::new(scenario)))
        }
        None => Ok(Arc::new(SimContext::empty())),
    }
}

pub fn run_with_args(args: &Cli) -> i32 {
    env_logger::Builder::new()
        .format_target(false)
        .format_timestamp(None)
        .filter_level(args.verbosity.0)
        .init();

    if args.usb_list {
        if let Err(e) = usb::print_usb_devices() {
            println!("Failed to enumerate USB devices: {}", e);
            return 1;
        }
        return 0;
    }

    let ctx = match make_context(args) {
        Ok(ctx) => ctx,
        Err(e) => {
            println!("{}", e);
            return 1;
        }
    };

    if args.list {
        list_devices(ctx.as_ref(), args.product_class.unwrap_or(product::ANY))
    } else if let Some(version) = &args.compare_version {
        compare_version(ctx.as_ref(), version)
    } else if args.info {
        print_info(ctx.as_ref())
    } else if args.update || args.recover {
        run_update(&ctx, args)
    } else if args.watch {
        watch(&ctx)
    } else {
        0
    }
}

fn list_devices(ctx: &dyn DeviceContext, filter: u8) -> i32 {
    if let Some(class) = <ProductClass as FromPrimitive>::from_u8(filter) {
        debug!("Filtering for product class {:?}", class);
    }
    let list = match ctx.query_devices(filter) {
        Ok(list) => list,
        Err(e) => {
            println!("Failed to query devices: {}", e);
            return 1;
        }
    };
    if list.count() == 0 {
        println!("No devices connected");
        return 0;
    }
    for index in 0..list.count() {
        let device = match list.open(index) {
            Ok(device) => device,
            Err(e) => {
                println!("Failed to open device {}: {}", index, e);
                continue;
            }
        };
        let name = device
            .get_info(CameraInfo::Name)
            .unwrap_or_else(|_| "unknown".to_string());
        println!("{}", name);
        if let Ok(serial) = device.get_info(CameraInfo::SerialNumber) {
            println!("  Serial:               {}", serial);
        }
        if classify(device.as_ref()) == DeviceClass::AlreadyInUpdateMode {
            println!("  In update (recovery) mode");
            continue;
        }
        if let Ok(fw) = device.get_info(CameraInfo::FirmwareVersion) {
            println!("  Firmware Version:     {}", fw);
        }
        if let Ok(recommended) = device.get_info(CameraInfo::RecommendedFirmwareVersion) {
            println!("  Recommended Version:  {}", recommended);
        }
    }
    0
}

fn print_info(ctx: &dyn DeviceContext) -> i32 {
    match crate::watcher::validate_device(ctx) {
        Ok(WatchState::WaitingForDevice) => {
            println!("No devices connected");
            0
        }
        Ok(WatchState::InUpdateMode) => {
            println!("The connected device is in update (recovery) mode");
            0
        }
        Ok(WatchState::UpdateRequired {
            current,
            recommended,
        }) => {
            println!("The FW of the connected device is: {}", current);
            println!("The minimal recommended FW for this device is: {}", recommended);
            println!("A firmware update is required");
            0
        }
        Ok(WatchState::Ready { name, firmware }) => {
            println!("{}", name);
            println!("  Firmware Version:     {}", firmware);
            println!("  No update required");
            0
        }
        Err(e) => {
            println!("{}", e);
            1
        }
    }
}

/// Gate the connected device's firmware against the given version
fn compare_version(ctx: &dyn DeviceContext, version: &str) -> i32 {
    let minimum: FirmwareVersion = match version.parse() {
        Ok(minimum) => minimum,
        Err(e) => {
            println!("{}", e);
            return 2;
        }
    };
    let list = match ctx.query_devices(product::ANY) {
        Ok(list) => list,
        Err(e) => {
            println!("Failed to query devices: {}", e);
            return 2;
        }
    };
    if list.count() == 0 {
        println!("No devices connected");
        return 2;
    }
    let fw = list
        .open(0)
        .and_then(|device| device.get_info(CameraInfo::FirmwareVersion));
    let current: FirmwareVersion = match fw {
        Ok(fw) => match fw.parse() {
            Ok(current) => current,
            Err(e) => {
                println!("{}", e);
                return 2;
            }
        },
        Err(e) => {
            println!("Failed to read firmware version: {}", e);
            return 2;
        }
    };
    match is_update_required(&current, &minimum) {
        Ok(true) => {
            println!("Device firmware {} is older than {}", current, minimum);
            1
        }
        Ok(false) => {
            println!("Device firmware {} meets {}", current, minimum);
            0
        }
        Err(e) => {
            println!("{}", e);
            2
        }
    }
}

fn run_update(ctx: &Arc<dyn DeviceContext>, args: &Cli) -> i32 {
    let store = FirmwareStore::from_config();
    let image_override = match &args.fw_file {
        Some(path) => match fs::read(path) {
            Ok(bytes) => {
                println!("File");
                println!("  Size:       {:>20} B", bytes.len());
                println!("  SHA-256:    {}", image_digest(&bytes));
                Some(bytes)
            }
            Err(e) => {
                println!("Failed to read {}: {}", path, e);
                return 1;
            }
        },
        None => None,
    };

    let updater = Updater::new();
    if args.recover {
        let serials = match recovery_serials(ctx.as_ref()) {
            Ok(serials) => serials,
            Err(e) => {
                println!("Failed to query devices: {}", e);
                return 1;
            }
        };
        if serials.is_empty() {
            println!("No devices in recovery mode found");
            return 0;
        }
        let mut failed = false;
        for serial in serials {
            println!("Updating device {}", serial);
            if run_one_update(&updater, ctx, Some(&serial), image_override.clone(), &store) != 0 {
                failed = true;
            }
        }
        if failed {
            1
        } else {
            0
        }
    } else {
        run_one_update(
            &updater,
            ctx,
            args.serial.as_deref(),
            image_override,
            &store,
        )
    }
}

fn recovery_serials(ctx: &dyn DeviceContext) -> Result<Vec<String>, crate::sdk::SdkError> {
    let list = ctx.query_devices(product::ANY)?;
    let mut serials = Vec::new();
    for index in 0..list.count() {
        let device = list.open(index)?;
        if classify(device.as_ref()) == DeviceClass::AlreadyInUpdateMode {
            serials.push(device.get_info(CameraInfo::SerialNumber)?);
        }
    }
    Ok(serials)
}

fn run_one_update(
    updater: &Updater,
    ctx: &Arc<dyn DeviceContext>,
    serial: Option<&str>,
    image_override: Option<Vec<u8>>,
    store: &FirmwareStore,
) -> i32 {
    let rx = match updater.start(Arc::clone(ctx), serial, image_override, store) {
        Ok(rx) => rx,
        Err(e) => {
            println!("{}", e);
            return 1;
        }
    };
    for event in rx {
        match event {
            UpdateEvent::Progress(fraction) => {
                print!("\rFW update progress: {}[%]", (fraction * 100.0) as i32);
                let _ = std::io::stdout().flush();
            }
            UpdateEvent::Succeeded => {
                println!();
                println!("Firmware update process finished successfully");
                return 0;
            }
            UpdateEvent::Failed(e) => {
                println!();
                println!("Firmware update process failed, error: {}", e);
                return 1;
            }
        }
    }
    // Worker went away without a terminal event
    println!("Firmware update process ended unexpectedly");
    1
}

fn print_watch_state(state: &WatchState) {
    match state {
        WatchState::WaitingForDevice => println!("Waiting for device..."),
        WatchState::InUpdateMode => {
            println!("Device in update (recovery) mode, run --recover to flash it")
        }
        WatchState::UpdateRequired {
            current,
            recommended,
        } => println!(
            "Device firmware {} is older than the recommended {}, run --update",
            current, recommended
        ),
        WatchState::Ready { name, firmware } => {
            println!("{} ready (firmware {})", name, firmware)
        }
    }
}

fn watch(ctx: &Arc<dyn DeviceContext>) -> i32 {
    let watcher = Watcher::register(Arc::clone(ctx));
    match watcher.current_state() {
        Ok(state) => print_watch_state(&state),
        Err(e) => println!("{}", e),
    }
    while let Some(state) = watcher.next_state() {
        match state {
            Ok(state) => print_watch_state(&state),
            Err(e) => println!("{}", e),
        }
    }
    0
}
