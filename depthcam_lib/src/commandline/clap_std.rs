//! Argument parsing with clap
//!
//! Kept separate from the dispatcher so the `Cli` struct carries no
//! clap types.
use clap::Parser;
use clap_num::maybe_hex;

use crate::commandline::{Cli, LogLevel};

/// Inspect and update the firmware of depth cameras
#[derive(Parser)]
#[command(arg_required_else_help = true)]
struct ClapCli {
    #[command(flatten)]
    verbosity: clap_verbosity_flag::Verbosity,

    /// List connected devices and their firmware versions
    #[arg(long, short)]
    list: bool,

    /// List raw devices on the USB bus
    #[arg(long)]
    usb_list: bool,

    /// Show firmware details of the connected device
    #[arg(long)]
    info: bool,

    /// Update the connected device to the bundled firmware
    #[arg(long)]
    update: bool,

    /// Flash every device found in recovery mode
    #[arg(long, short)]
    recover: bool,

    /// Report attach/detach events and the resulting device state
    #[arg(long)]
    watch: bool,

    /// Select a device by serial number
    #[arg(long, short)]
    serial: Option<String>,

    /// Flash this firmware file instead of the bundled image
    #[arg(long, short, value_name = "FW_FILE")]
    fw_file: Option<std::path::PathBuf>,

    /// Only consider devices of this product class bitmask
    #[arg(long, value_parser=maybe_hex::<u8>)]
    product_class: Option<u8>,

    /// Exit non-zero if the device firmware is older than this version
    #[arg(long)]
    compare_version: Option<String>,

    /// Run against a simulated device scenario loaded from a TOML file
    #[arg(long)]
    scenario: Option<std::path::PathBuf>,
}

/// Parse a list of commandline arguments and return the struct
pub fn parse(args: &[String]) -> Cli {
    let args = ClapCli::parse_from(args);

    Cli {
        verbosity: LogLevel(args.verbosity.log_level_filter()),
        list: args.list,
        usb_list: args.usb_list,
        info: args.info,
        update: args.update,
        recover: args.recover,
        watch: args.watch,
        serial: args.serial,
        fw_file: args
            .fw_file
            .map(|x| x.into_os_string().into_string().unwrap()),
        product_class: args.product_class,
        compare_version: args.compare_version,
        scenario: args
            .scenario
            .map(|x| x.into_os_string().into_string().unwrap()),
    }
}
