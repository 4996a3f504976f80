use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use ipftrace::catalog::{EventNames, FunctionCatalog};
use ipftrace::decoder::{EventDecoder, RawEvent};
use ipftrace::domain::{EventId, L3Proto, L4Proto};
use ipftrace::filter::{self, FilterSpec};
use ipftrace::probe;
use ipftrace::processor::{run_trace_loop, EventProcessor, ExitReason};
use ipftrace::protocols::ProtocolCatalog;
use ipftrace::runtime::ReplayChannel;

const ETHERTYPES: &str = "IPv4 0800 ip ip4\nARP 0806 ether-arp\nIPv6 86DD ip6\n";
const PROTOCOLS: &str = "icmp 1 ICMP\ntcp 6 TCP\nudp 17 UDP\n";

const TWO_FUNCTIONS: &str = r#"{
    "functions": {
        "g": [
            { "name": "f1", "args": ["struct sk_buff *skb"] },
            { "name": "f2", "args": ["struct sk_buff *skb"] }
        ]
    }
}"#;

fn protocols() -> ProtocolCatalog {
    ProtocolCatalog::from_readers(ETHERTYPES.as_bytes(), PROTOCOLS.as_bytes()).unwrap()
}

fn tcp_flow(id: u8, ipv4: L3Proto) -> RawEvent {
    RawEvent::ipv4(
        EventId(id),
        L4Proto(6),
        ipv4,
        (Ipv4Addr::new(10, 0, 0, 1), 1234),
        (Ipv4Addr::new(10, 0, 0, 2), 80),
    )
}

#[test]
fn test_same_flow_through_two_functions() {
    let catalog = FunctionCatalog::from_json(TWO_FUNCTIONS).unwrap();
    let protocols = protocols();
    let program = probe::assemble(&catalog);
    let ipv4 = protocols.l3_id("IPv4").unwrap();

    let decoder = EventDecoder::new(program.events.clone(), &protocols).unwrap();
    let mut processor = EventProcessor::new(decoder);
    processor.process_record(&tcp_flow(0, ipv4).to_bytes());
    processor.process_record(&tcp_flow(1, ipv4).to_bytes());

    let mut out = Vec::new();
    processor.render(&mut out).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "TCP\t10.0.0.1:1234\t->\t10.0.0.2:80\t[f1, f2]\n");

    let rows: Vec<_> = processor.aggregator().iter().collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].1, ["f1", "f2"]);
}

#[test]
fn test_assembler_and_decoder_tables_agree() {
    let catalog = FunctionCatalog::from_json(TWO_FUNCTIONS).unwrap();
    let program = probe::assemble(&catalog);
    let independent = EventNames::from_catalog(&catalog);

    assert_eq!(program.events, independent);
    for (idx, point) in catalog.probe_points().enumerate() {
        assert_eq!(point.id.index(), idx);
        assert_eq!(independent.resolve(point.id), Some(point.function.name.as_str()));
    }
}

#[test]
fn test_unsupported_l3_leaves_table_untouched() {
    let catalog = FunctionCatalog::from_json(TWO_FUNCTIONS).unwrap();
    let protocols = protocols();
    let decoder = EventDecoder::new(EventNames::from_catalog(&catalog), &protocols).unwrap();
    let mut processor = EventProcessor::new(decoder);

    let arp = protocols.l3_id("ARP").unwrap();
    processor.process_record(&tcp_flow(0, arp).to_bytes());
    processor.process_record(&tcp_flow(0, L3Proto(0xbeef)).to_bytes());

    assert!(processor.aggregator().is_empty());
    assert_eq!(processor.stats.unsupported_l3, 2);
}

#[test]
fn test_unfiltered_spec_has_no_constants() {
    let symbols = filter::compile(&FilterSpec::default(), &protocols()).unwrap();
    assert!(symbols.iter().all(|s| s.value.is_none() && s.name.ends_with("_ANY")));
}

#[tokio::test]
async fn test_ipv6_flows_through_trace_loop() {
    let catalog = FunctionCatalog::from_json(TWO_FUNCTIONS).unwrap();
    let protocols = protocols();
    let ipv6 = protocols.l3_id("6").unwrap();
    let decoder = EventDecoder::new(EventNames::from_catalog(&catalog), &protocols).unwrap();
    let mut processor = EventProcessor::new(decoder);

    let saddr: Ipv6Addr = "2001:db8::10".parse().unwrap();
    let daddr: Ipv6Addr = "2001:db8::20".parse().unwrap();
    let echo = RawEvent::ipv6(EventId(1), L4Proto(1), ipv6, (saddr, 0), (daddr, 0));
    let mut channel = ReplayChannel::new().with_batch([echo.to_bytes(), echo.to_bytes()]);
    let mut out = Vec::new();

    let reason = run_trace_loop(
        &mut channel,
        &mut processor,
        Duration::from_millis(10),
        &mut out,
        std::future::pending::<()>(),
    )
    .await
    .unwrap();

    assert_eq!(reason, ExitReason::ChannelClosed);
    assert_eq!(String::from_utf8(out).unwrap(), "ICMP\t2001:db8::10\t->\t2001:db8::20\t[f2]\n");
}
