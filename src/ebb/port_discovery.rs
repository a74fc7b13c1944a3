use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;

use crate::plotter_hal::{HalError, HalResult};
use crate::plotter_options::{PlotterOptions, PortConfig};

const SYS_CLASS_TTY: &str = "/sys/class/tty";
const DEV: &str = "/dev";
const EBB_VENDOR_ID: &str = "04d8";
const EBB_PRODUCT_ID: &str = "fd92";

pub fn resolve_port(options: &PlotterOptions) -> HalResult<PathBuf> {
    if let Some(port) = &options.port {
        let path = if port.contains('/') {
            PathBuf::from(port)
        } else {
            Path::new(DEV).join(port)
        };
        return Ok(path);
    }
    if options.port_config == PortConfig::UsePort {
        return Err(HalError::NoDevice("port_config requires an explicit port".to_owned()));
    }
    find_ebb_ports_in(Path::new(SYS_CLASS_TTY), Path::new(DEV))?
        .into_iter()
        .next()
        .ok_or_else(|| HalError::NoDevice(format!("no EiBotBoard under {SYS_CLASS_TTY}")))
}

/// Lists tty nodes whose parent USB device carries the EiBotBoard vendor and product ids.
pub fn find_ebb_ports_in(sys_class_tty: &Path, dev: &Path) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    if !sys_class_tty.exists() {
        return Ok(found);
    }
    for entry in fs::read_dir(sys_class_tty)? {
        let entry = entry?;
        // device/ points at the USB interface; its parent is the USB device with the ids.
        let usb_device = entry.path().join("device").join("..");
        let vendor = read_usb_id(&usb_device.join("idVendor"));
        let product = read_usb_id(&usb_device.join("idProduct"));
        if vendor.as_deref() == Some(EBB_VENDOR_ID) && product.as_deref() == Some(EBB_PRODUCT_ID) {
            let port = dev.join(entry.file_name());
            debug!("found EiBotBoard at {}", port.display());
            found.push(port);
        }
    }
    found.sort();
    Ok(found)
}

fn read_usb_id(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|id| id.trim().to_lowercase())
}
