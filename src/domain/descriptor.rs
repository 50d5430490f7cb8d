//! Parser for the domain configuration descriptor (libvirt domain XML).
//!
//! Only the parts the exporter needs are extracted: block devices under
//! `<devices><disk>` and network interfaces under `<devices><interface>`.

use roxmltree::{Document, Node};

use crate::error::{Result, ScrapeError};

/// Value of the `device` attribute on a `<disk>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceClass {
    Disk,
    Cdrom,
    Floppy,
    Lun,
    Other(String),
}

impl DeviceClass {
    fn parse(value: &str) -> Self {
        match value {
            "disk" => DeviceClass::Disk,
            "cdrom" => DeviceClass::Cdrom,
            "floppy" | "fd" => DeviceClass::Floppy,
            "lun" => DeviceClass::Lun,
            other => DeviceClass::Other(other.to_string()),
        }
    }

    /// Removable media carry no meaningful I/O counters.
    pub fn has_io_counters(&self) -> bool {
        !matches!(self, DeviceClass::Cdrom | DeviceClass::Floppy)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDevice {
    pub class: DeviceClass,
    /// Backing file, block device path or network volume name.
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    pub source_bridge: String,
    pub target: String,
}

/// Devices attached to one domain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainDescriptor {
    pub disks: Vec<BlockDevice>,
    pub interfaces: Vec<NetworkInterface>,
}

impl DomainDescriptor {
    /// Parses a domain XML document.
    pub fn parse(xml: &str) -> Result<Self> {
        let doc = Document::parse(xml)
            .map_err(|e| ScrapeError::Descriptor(format!("failed to unmarshal domain: {}", e)))?;

        let root = doc.root_element();
        if root.tag_name().name() != "domain" {
            return Err(ScrapeError::Descriptor(format!(
                "unexpected root element <{}>",
                root.tag_name().name()
            )));
        }

        let mut descriptor = DomainDescriptor::default();

        for devices in root.children().filter(|n| n.has_tag_name("devices")) {
            for node in devices.children().filter(Node::is_element) {
                match node.tag_name().name() {
                    "disk" => descriptor.disks.push(parse_disk(node)),
                    "interface" => descriptor.interfaces.push(parse_interface(node)),
                    _ => {}
                }
            }
        }

        Ok(descriptor)
    }

    /// Block devices that expose I/O counters.
    pub fn collectible_disks(&self) -> impl Iterator<Item = &BlockDevice> {
        self.disks.iter().filter(|d| d.class.has_io_counters())
    }

    /// Interfaces with a host-side target device.
    pub fn collectible_interfaces(&self) -> impl Iterator<Item = &NetworkInterface> {
        self.interfaces.iter().filter(|i| !i.target.is_empty())
    }
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(name))
}

fn parse_disk(node: Node) -> BlockDevice {
    // libvirt defaults the device class to "disk" when omitted
    let class = DeviceClass::parse(node.attribute("device").unwrap_or("disk"));

    let source = child(node, "source")
        .and_then(|s| {
            s.attribute("file")
                .or_else(|| s.attribute("dev"))
                .or_else(|| s.attribute("name"))
        })
        .unwrap_or_default()
        .to_string();

    let target = child(node, "target")
        .and_then(|t| t.attribute("dev"))
        .unwrap_or_default()
        .to_string();

    BlockDevice {
        class,
        source,
        target,
    }
}

fn parse_interface(node: Node) -> NetworkInterface {
    let source_bridge = child(node, "source")
        .and_then(|s| s.attribute("bridge"))
        .unwrap_or_default()
        .to_string();

    let target = child(node, "target")
        .and_then(|t| t.attribute("dev"))
        .unwrap_or_default()
        .to_string();

    NetworkInterface {
        source_bridge,
        target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOMAIN_XML: &str = r#"
<domain type='kvm' id='3'>
  <name>vm1</name>
  <uuid>4dea22b3-1d52-d8f3-2616-782fbd6a0c5e</uuid>
  <devices>
    <emulator>/usr/bin/qemu-system-x86_64</emulator>
    <disk type='file' device='disk'>
      <driver name='qemu' type='qcow2'/>
      <source file='/var/lib/vm1.qcow2'/>
      <target dev='vda' bus='virtio'/>
    </disk>
    <disk type='block' device='disk'>
      <source dev='/dev/vg0/data'/>
      <target dev='vdb' bus='virtio'/>
    </disk>
    <disk type='file' device='cdrom'>
      <target dev='hdc' bus='ide'/>
      <readonly/>
    </disk>
    <interface type='bridge'>
      <mac address='52:54:00:aa:bb:cc'/>
      <source bridge='br0'/>
      <target dev='vnet0'/>
    </interface>
    <interface type='network'>
      <source network='default'/>
    </interface>
  </devices>
</domain>"#;

    #[test]
    fn test_parse_devices() {
        let d = DomainDescriptor::parse(DOMAIN_XML).unwrap();

        assert_eq!(d.disks.len(), 3);
        assert_eq!(d.disks[0].class, DeviceClass::Disk);
        assert_eq!(d.disks[0].source, "/var/lib/vm1.qcow2");
        assert_eq!(d.disks[0].target, "vda");
        assert_eq!(d.disks[1].source, "/dev/vg0/data");
        assert_eq!(d.disks[2].class, DeviceClass::Cdrom);
        assert_eq!(d.disks[2].source, "");

        assert_eq!(d.interfaces.len(), 2);
        assert_eq!(d.interfaces[0].source_bridge, "br0");
        assert_eq!(d.interfaces[0].target, "vnet0");
        assert_eq!(d.interfaces[1].target, "");
    }

    #[test]
    fn test_collectible_filters() {
        let d = DomainDescriptor::parse(DOMAIN_XML).unwrap();

        let disks: Vec<_> = d.collectible_disks().map(|d| d.target.as_str()).collect();
        assert_eq!(disks, vec!["vda", "vdb"]);

        let ifaces: Vec<_> = d.collectible_interfaces().map(|i| i.target.as_str()).collect();
        assert_eq!(ifaces, vec!["vnet0"]);
    }

    #[test]
    fn test_floppy_aliases() {
        assert!(!DeviceClass::parse("fd").has_io_counters());
        assert!(!DeviceClass::parse("floppy").has_io_counters());
        assert!(DeviceClass::parse("lun").has_io_counters());
    }

    #[test]
    fn test_domain_without_devices() {
        let d = DomainDescriptor::parse("<domain><name>empty</name></domain>").unwrap();
        assert!(d.disks.is_empty());
        assert!(d.interfaces.is_empty());
    }

    #[test]
    fn test_malformed_xml_is_descriptor_error() {
        let err = DomainDescriptor::parse("<domain><devices>").unwrap_err();
        assert_eq!(err.kind(), "descriptor");

        let err = DomainDescriptor::parse("<network/>").unwrap_err();
        assert_eq!(err.kind(), "descriptor");
    }
}
