// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! End-to-end control plane scenarios against the emulated driver backend.

use control::api::{CtlRequest, CtlResponse};
use control::iface::IfaceFlags;
use control::{
    ControlPlane, ControlPlaneParamsBuilder, CtlError, IfaceConfig, IfaceInfoConfig, VlanConfig,
};
use ethdev::null::NullEthdev;
use ethdev::{CpuId, Ethdev, Lcore, PortId, SocketId};
use net::eth::Mac;
use net::iface::IfaceName;
use net::ipv4::Ipv4Prefix;
use net::vlan::Vid;
use std::net::Ipv4Addr;
use tracing_test::traced_test;

fn plane_with(drv: NullEthdev) -> ControlPlane<NullEthdev> {
    let params = ControlPlaneParamsBuilder::default()
        .name("scenario")
        .build()
        .unwrap();
    ControlPlane::new(params, drv)
}

fn plane() -> ControlPlane<NullEthdev> {
    plane_with(NullEthdev::new())
}

fn name(s: &str) -> IfaceName {
    IfaceName::try_from(s).unwrap()
}

fn mac(s: &str) -> Mac {
    s.parse().unwrap()
}

fn prefix(s: &str) -> Ipv4Prefix {
    s.parse().unwrap()
}

fn vlan_config(parent: net::iface::IfaceId, vid: u16, mcast: &str) -> IfaceConfig {
    IfaceConfig {
        name: name(&format!("vlan{vid}")),
        flags: IfaceFlags::UP,
        mtu: 1500,
        vrf_id: 0,
        info: IfaceInfoConfig::Vlan(VlanConfig {
            parent,
            vlan_id: Vid::new(vid).unwrap(),
            mac: mac(mcast),
        }),
    }
}

#[test]
#[traced_test]
fn port_create() {
    let mut plane = plane();
    let desc = plane.port_add(&name("p0"), "net_null0").unwrap();

    assert!(!desc.mac.is_zero());
    assert!(desc.mtu >= 64);
    assert_eq!(desc.n_rxqs, 1);
    assert_eq!(desc.n_txqs, plane.workers().count());
    assert_eq!(plane.port_get(&name("p0")).unwrap(), desc);
    assert_eq!(plane.port_list().unwrap().len(), 1);
}

#[test]
fn duplicate_port_names_do_not_probe_twice() {
    let mut plane = plane();
    plane.port_add(&name("p0"), "net_null0").unwrap();
    assert_eq!(plane.driver().probe_attempts(), 1);

    let err = plane.port_add(&name("p0"), "net_null1").unwrap_err();
    assert!(matches!(err, CtlError::NameInUse(_)));
    assert_eq!(err.errno(), 17 /* EEXIST */);
    // the second device was never probed
    assert_eq!(plane.driver().probe_attempts(), 1);

    // same device arguments conflict as well, still without a probe
    let err = plane.port_add(&name("p1"), "net_null0").unwrap_err();
    assert!(matches!(err, CtlError::DeviceInUse(_)));
    assert_eq!(plane.driver().probe_attempts(), 1);
}

#[test]
#[traced_test]
fn vlan_add_conflict_delete_readd() {
    let mut plane = plane();
    let port = plane.port_add(&name("p0"), "net_null0").unwrap();

    let config = vlan_config(port.id, 100, "01:00:5e:00:00:01");
    let vlan_id = plane.iface_add(&config).unwrap();

    // the parent device filters the vlan and the multicast mac
    let filters = plane.driver().vlan_filters(PortId(port.port_id)).unwrap();
    assert_eq!(filters, vec![100]);
    let macs = plane.driver().mac_filters(PortId(port.port_id)).unwrap();
    assert!(macs.contains(&mac("01:00:5e:00:00:01")));

    // the (parent, vlan) key is taken now
    let mut dup = vlan_config(port.id, 100, "01:00:5e:00:00:02");
    dup.name = name("vlan100b");
    let err = plane.iface_add(&dup).unwrap_err();
    assert!(matches!(err, CtlError::VlanInUse { .. }));
    assert_eq!(err.errno(), 98 /* EADDRINUSE */);

    // the parent cannot go away while the sub-interface lives
    assert!(matches!(
        plane.port_del(&name("p0")),
        Err(CtlError::HasChildren(_))
    ));

    // delete and re-add with the same key
    plane.iface_del(vlan_id).unwrap();
    assert!(plane
        .driver()
        .vlan_filters(PortId(port.port_id))
        .unwrap()
        .is_empty());
    assert!(plane
        .driver()
        .mac_filters(PortId(port.port_id))
        .unwrap()
        .is_empty());
    plane.iface_add(&config).unwrap();
}

#[test]
fn vlan_filter_unsupported_is_best_effort() {
    let mut plane = plane_with(NullEthdev::new().without_vlan_filter());
    let port = plane.port_add(&name("p0"), "net_null0").unwrap();

    // the driver refuses vlan filtering, the sub-interface still comes up
    let vlan_id = plane
        .iface_add(&vlan_config(port.id, 42, "01:00:5e:00:00:2a"))
        .unwrap();
    assert_eq!(plane.vlan_iface(port.id, Vid::new(42).unwrap()), Some(vlan_id));
    plane.iface_del(vlan_id).unwrap();
}

#[test]
fn vlan_requires_multicast_mac() {
    let mut plane = plane();
    let port = plane.port_add(&name("p0"), "net_null0").unwrap();
    let err = plane
        .iface_add(&vlan_config(port.id, 100, "02:00:00:00:00:01"))
        .unwrap_err();
    assert!(matches!(err, CtlError::InvalidArg(_)));
    // nothing was left behind
    assert_eq!(plane.vlan_iface(port.id, Vid::new(100).unwrap()), None);
    plane
        .iface_add(&vlan_config(port.id, 100, "01:00:5e:00:00:01"))
        .unwrap();
}

#[test]
#[traced_test]
fn nexthop_add_get_del() {
    let mut plane = plane();
    let port = plane.port_add(&name("p0"), "net_null0").unwrap();
    let host = Ipv4Addr::new(10, 0, 0, 1);

    plane
        .nh4_add(host, port.id, mac("02:00:00:00:00:01"), false)
        .unwrap();

    let hop = plane.route4_get(host).unwrap();
    assert_eq!(hop.host, host);
    assert_eq!(hop.iface, Some(port.id));
    assert_eq!(hop.mac, mac("02:00:00:00:00:01"));
    assert_eq!(hop.age_secs, None);

    // idempotent re-add with a matching body
    plane
        .nh4_add(host, port.id, mac("02:00:00:00:00:01"), true)
        .unwrap();
    assert_eq!(plane.nh4_list().len(), 1);

    plane.nh4_del(host, false).unwrap();
    let err = plane.route4_get(host).unwrap_err();
    assert!(matches!(err, CtlError::NetUnreachable(_)));
    assert_eq!(err.errno(), 101 /* ENETUNREACH */);

    // missing_ok delete of the now absent host
    plane.nh4_del(host, true).unwrap();
}

#[test]
fn busy_nexthop_is_protected_by_routes() {
    let mut plane = plane();
    let port = plane.port_add(&name("p0"), "net_null0").unwrap();
    let gw = Ipv4Addr::new(10, 0, 0, 1);

    plane
        .nh4_add(gw, port.id, mac("02:00:00:00:00:01"), false)
        .unwrap();
    plane.route4_add(prefix("10.0.0.0/24"), gw, false).unwrap();

    let err = plane.nh4_del(gw, false).unwrap_err();
    assert!(matches!(err, CtlError::NexthopBusy(_)));
    assert_eq!(err.errno(), 16 /* EBUSY */);

    // a covered address resolves through the gateway
    let hop = plane.route4_get(Ipv4Addr::new(10, 0, 0, 77)).unwrap();
    assert_eq!(hop.host, gw);

    plane.route4_del(prefix("10.0.0.0/24"), false).unwrap();
    plane.nh4_del(gw, false).unwrap();
    assert!(plane.nh4_list().is_empty());
    assert!(plane.route4_list().is_empty());
}

#[test]
#[traced_test]
fn worker_shrink_on_port_delete() {
    let drv = NullEthdev::with_lcores(vec![
        Lcore {
            cpu: CpuId(1),
            socket: SocketId(0),
        },
        Lcore {
            cpu: CpuId(2),
            socket: SocketId(1),
        },
    ]);
    let mut plane = plane_with(drv);

    plane.port_add(&name("p0"), "net_null0,socket=0").unwrap();
    assert_eq!(plane.workers().count(), 1);
    assert_eq!(plane.port_get(&name("p0")).unwrap().n_txqs, 1);

    // the second port lives on the other socket and gets its own worker;
    // every port now carries one tx queue per worker
    plane.port_add(&name("p1"), "net_null1,socket=1").unwrap();
    assert_eq!(plane.workers().count(), 2);
    assert_eq!(plane.port_get(&name("p0")).unwrap().n_txqs, 2);
    assert_eq!(plane.port_get(&name("p1")).unwrap().n_txqs, 2);

    // deleting p1 idles its worker; the survivor's tx queues shrink
    plane.port_del(&name("p1")).unwrap();
    assert_eq!(plane.workers().count(), 1);
    assert_eq!(plane.port_get(&name("p0")).unwrap().n_txqs, 1);

    // the freed device can be probed again
    plane.port_add(&name("p1"), "net_null1,socket=1").unwrap();
    assert_eq!(plane.port_get(&name("p0")).unwrap().n_txqs, 2);
}

#[test]
fn port_delete_frees_the_pool_and_device() {
    let mut plane = plane();
    plane.port_add(&name("p0"), "net_null0").unwrap();
    assert_eq!(plane.driver().pool_count(), 1);

    plane.port_del(&name("p0")).unwrap();
    assert_eq!(plane.driver().pool_count(), 0);
    assert!(plane.driver().port_by_devargs("net_null0").is_none());
    assert!(matches!(
        plane.port_get(&name("p0")),
        Err(CtlError::NoSuchPort(_))
    ));
}

#[test]
fn dispatch_covers_the_request_surface() {
    let mut plane = plane();

    let CtlResponse::Port(port) = plane
        .dispatch(CtlRequest::PortAdd {
            name: name("p0"),
            devargs: "net_null0".to_string(),
        })
        .unwrap()
    else {
        panic!("expected a port descriptor");
    };

    let CtlResponse::IfaceId(vlan_id) = plane
        .dispatch(CtlRequest::IfaceAdd {
            config: vlan_config(port.id, 100, "01:00:5e:00:00:01"),
        })
        .unwrap()
    else {
        panic!("expected an interface id");
    };

    let CtlResponse::Ifaces(ifaces) = plane.dispatch(CtlRequest::IfaceList).unwrap() else {
        panic!("expected interfaces");
    };
    assert_eq!(ifaces.len(), 2);

    plane
        .dispatch(CtlRequest::Nh4Add {
            host: Ipv4Addr::new(10, 0, 0, 1),
            iface: port.id,
            mac: mac("02:00:00:00:00:01"),
            exist_ok: false,
        })
        .unwrap();
    plane
        .dispatch(CtlRequest::Route4Add {
            dest: prefix("0.0.0.0/0"),
            gw: Ipv4Addr::new(10, 0, 0, 1),
            exist_ok: false,
        })
        .unwrap();

    let CtlResponse::Nexthop(hop) = plane
        .dispatch(CtlRequest::Route4Get {
            addr: Ipv4Addr::new(203, 0, 113, 9),
        })
        .unwrap()
    else {
        panic!("expected a nexthop");
    };
    assert_eq!(hop.host, Ipv4Addr::new(10, 0, 0, 1));

    let CtlResponse::Routes(routes) = plane.dispatch(CtlRequest::Route4List).unwrap() else {
        panic!("expected routes");
    };
    // the host route of the nexthop plus the default route
    assert_eq!(routes.len(), 2);

    plane
        .dispatch(CtlRequest::IfaceDel { id: vlan_id })
        .unwrap();
    let err = plane
        .dispatch(CtlRequest::PortGet {
            name: name("nope"),
        })
        .unwrap_err();
    assert_eq!(err.errno(), 19 /* ENODEV */);
}
