//! Disk and network throughput from `/proc/diskstats` and `/proc/net/dev`.

use serde::Serialize;

const SECTOR_BYTES: u64 = 512;
const DISK_PREFIXES: [&str; 6] = ["sd", "hd", "vd", "xvd", "nvme", "mmcblk"];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiskCounters {
    pub device: String,
    pub reads_completed: u64,
    pub sectors_read: u64,
    pub writes_completed: u64,
    pub sectors_written: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NetCounters {
    pub interface: String,
    pub bytes_received: u64,
    pub packets_received: u64,
    pub bytes_transmitted: u64,
    pub packets_transmitted: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DiskRate {
    pub device: String,
    pub read_bytes_per_sec: f64,
    pub write_bytes_per_sec: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NetRate {
    pub interface: String,
    pub rx_bytes_per_sec: f64,
    pub tx_bytes_per_sec: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct IoSnapshot {
    pub sampled_at: u64,
    pub disks: Vec<DiskRate>,
    pub interfaces: Vec<NetRate>,
}

pub fn parse_diskstats(content: &str) -> Vec<DiskCounters> {
    content
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 14 {
                return None;
            }
            let device = fields[2];
            if !DISK_PREFIXES.iter().any(|p| device.starts_with(p)) {
                return None;
            }
            let num = |i: usize| fields[i].parse::<u64>().unwrap_or(0);
            Some(DiskCounters {
                device: device.to_string(),
                reads_completed: num(3),
                sectors_read: num(5),
                writes_completed: num(7),
                sectors_written: num(9),
            })
        })
        .collect()
}

/// Parses `/proc/net/dev`, skipping the two header lines and loopback.
pub fn parse_net_dev(content: &str) -> Vec<NetCounters> {
    content
        .lines()
        .skip(2)
        .filter_map(|line| {
            let (name, rest) = line.split_once(':')?;
            let interface = name.trim();
            if interface == "lo" {
                return None;
            }
            let values: Vec<u64> = rest
                .split_whitespace()
                .map(|v| v.parse().unwrap_or(0))
                .collect();
            if values.len() < 16 {
                return None;
            }
            Some(NetCounters {
                interface: interface.to_string(),
                bytes_received: values[0],
                packets_received: values[1],
                bytes_transmitted: values[8],
                packets_transmitted: values[9],
            })
        })
        .collect()
}

/// Devices present in only one of the two samples are skipped.
pub fn disk_rates(
    previous: &[DiskCounters],
    current: &[DiskCounters],
    elapsed_secs: f64,
) -> Vec<DiskRate> {
    if elapsed_secs <= 0.0 {
        return Vec::new();
    }
    current
        .iter()
        .filter_map(|curr| {
            let prev = previous.iter().find(|p| p.device == curr.device)?;
            let read = curr.sectors_read.saturating_sub(prev.sectors_read) * SECTOR_BYTES;
            let written = curr.sectors_written.saturating_sub(prev.sectors_written) * SECTOR_BYTES;
            Some(DiskRate {
                device: curr.device.clone(),
                read_bytes_per_sec: read as f64 / elapsed_secs,
                write_bytes_per_sec: written as f64 / elapsed_secs,
            })
        })
        .collect()
}

pub fn net_rates(
    previous: &[NetCounters],
    current: &[NetCounters],
    elapsed_secs: f64,
) -> Vec<NetRate> {
    if elapsed_secs <= 0.0 {
        return Vec::new();
    }
    current
        .iter()
        .filter_map(|curr| {
            let prev = previous.iter().find(|p| p.interface == curr.interface)?;
            let rx = curr.bytes_received.saturating_sub(prev.bytes_received);
            let tx = curr.bytes_transmitted.saturating_sub(prev.bytes_transmitted);
            Some(NetRate {
                interface: curr.interface.clone(),
                rx_bytes_per_sec: rx as f64 / elapsed_secs,
                tx_bytes_per_sec: tx as f64 / elapsed_secs,
            })
        })
        .collect()
}
