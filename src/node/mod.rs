//! The node actor: one owner for all protocol state, plus its async runtime.

mod core;
mod runtime;

pub use self::core::{NodeConfig, NodeCore, NodeNotification};
pub use runtime::Node;

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::core::{NodeConfig, NodeCore, NodeNotification};
    use crate::acl::cluster::AccessControlCluster;
    use crate::core::{PROTOCOL_INTERACTION_MODEL, PROTOCOL_SECURE_CHANNEL};
    use crate::im::cluster::testutil::TestOnOff;
    use crate::im::messages::{
        AttributeReport, ImOpcode, InvokeRequest, ReadRequest, ReportData, SubscribeRequest,
        SubscribeResponse,
    };
    use crate::im::path::{AttributePath, CommandPath};
    use crate::message::{
        decode, encode_plain, encode_secured, open_sealed, DecodedFrame, Destination, Message,
        MessageHeader, ProtocolHeader, SecureChannelOpcode, SecurityFlags, StatusReport,
    };
    use crate::secure_channel::PaseInitiator;
    use crate::session::{SessionSecrets, TransportBinding};
    use crate::tlv::TlvValue;
    use crate::transport::TransportEvent;

    const PASSCODE: u32 = 20202021;

    fn udp_binding() -> TransportBinding {
        TransportBinding::Udp("192.0.2.9:5540".parse().unwrap())
    }

    fn test_node() -> NodeCore {
        let mut node = NodeCore::new(NodeConfig {
            passcode: PASSCODE,
            pase_salt: vec![0x11; 32],
            pase_iterations: 1000,
        });
        node.data_model_mut().add_cluster(0, Box::new(AccessControlCluster::new()));
        node.data_model_mut().add_cluster(1, Box::new(TestOnOff::new()));
        node
    }

    fn sc_frame(counter: u32, exchange_id: u16, opcode: SecureChannelOpcode, payload: Vec<u8>) -> Vec<u8> {
        let protocol =
            ProtocolHeader::new(PROTOCOL_SECURE_CHANNEL, opcode.as_byte(), exchange_id, true)
                .with_reliability();
        encode_plain(&Message { header: MessageHeader::unsecured(counter), protocol, payload })
    }

    fn decode_plain(frame: &[u8]) -> Message {
        match decode(frame).unwrap() {
            DecodedFrame::Plain(message) => message,
            DecodedFrame::Sealed(_) => panic!("expected plain frame"),
        }
    }

    fn take_single(node: &mut NodeCore) -> Vec<u8> {
        let mut outbox = node.take_outbox();
        assert_eq!(outbox.len(), 1, "expected exactly one outbound frame");
        outbox.pop().unwrap().1
    }

    fn im_frame(
        secrets: &SessionSecrets,
        counter: u32,
        exchange_id: u16,
        opcode: ImOpcode,
        payload: Vec<u8>,
    ) -> Vec<u8> {
        let message = Message {
            header: MessageHeader {
                session_id: secrets.peer_session_id,
                security_flags: SecurityFlags::UNICAST,
                counter,
                source_node_id: None,
                destination: Destination::None,
            },
            protocol: ProtocolHeader::new(
                PROTOCOL_INTERACTION_MODEL,
                opcode.as_byte(),
                exchange_id,
                true,
            )
            .with_reliability(),
            payload,
        };
        encode_secured(&message, &secrets.encrypt_key, 0).unwrap()
    }

    fn open_frame(secrets: &SessionSecrets, frame: &[u8]) -> Message {
        match decode(frame).unwrap() {
            DecodedFrame::Sealed(sealed) => {
                open_sealed(&sealed, &secrets.decrypt_key, 0).unwrap()
            }
            DecodedFrame::Plain(_) => panic!("expected sealed frame"),
        }
    }

    /// Drive a full PASE commissioning against the node; returns the
    /// commissioner-side secrets.
    fn commission(node: &mut NodeCore, now: Instant) -> SessionSecrets {
        let mut commissioner = PaseInitiator::new(PASSCODE, 2);
        let binding = udp_binding();

        let request = commissioner.start().unwrap();
        node.on_frame(binding, &sc_frame(10, 1, SecureChannelOpcode::PbkdfParamRequest, request), now);
        let response = decode_plain(&take_single(node));
        assert_eq!(response.protocol.opcode, SecureChannelOpcode::PbkdfParamResponse.as_byte());

        let pake1 = commissioner.on_pbkdf_param_response(&response.payload).unwrap();
        node.on_frame(binding, &sc_frame(11, 1, SecureChannelOpcode::Pake1, pake1), now);
        let pake2 = decode_plain(&take_single(node));
        assert_eq!(pake2.protocol.opcode, SecureChannelOpcode::Pake2.as_byte());

        let pake3 = commissioner.on_pake2(&pake2.payload).unwrap();
        node.on_frame(binding, &sc_frame(12, 1, SecureChannelOpcode::Pake3, pake3), now);
        let status = decode_plain(&take_single(node));
        assert_eq!(status.protocol.opcode, SecureChannelOpcode::StatusReport.as_byte());
        let report = StatusReport::from_bytes(&status.payload).unwrap();
        assert!(report.is_success());

        commissioner.on_status(true).unwrap()
    }

    #[test]
    fn test_pase_commissioning_establishes_session() {
        let mut node = test_node();
        let now = Instant::now();
        let secrets = commission(&mut node, now);

        let notifications = node.take_notifications();
        assert_eq!(notifications.len(), 1);
        let NodeNotification::SessionEstablished { session_id, .. } = notifications[0] else {
            panic!("expected establishment notification");
        };
        assert_eq!(session_id, secrets.peer_session_id);
    }

    #[test]
    fn test_secured_read_after_commissioning() {
        let mut node = test_node();
        let now = Instant::now();
        let secrets = commission(&mut node, now);
        node.take_notifications();

        let read = ReadRequest {
            paths: vec![AttributePath::concrete(1, 6, 0)],
            fabric_filtered: false,
        };
        node.on_frame(
            udp_binding(),
            &im_frame(&secrets, 100, 5, ImOpcode::ReadRequest, read.encode()),
            now,
        );

        let response = open_frame(&secrets, &take_single(&mut node));
        assert_eq!(response.protocol.opcode, ImOpcode::ReportData.as_byte());
        let report = ReportData::decode(&response.payload).unwrap();
        assert_eq!(report.reports.len(), 1);
        assert!(matches!(
            report.reports[0],
            AttributeReport::Data { value: TlvValue::Bool(false), .. }
        ));
        // the response acknowledges our reliable request
        assert_eq!(response.protocol.ack_counter, Some(100));
    }

    #[test]
    fn test_secured_invoke_toggles_state() {
        let mut node = test_node();
        let now = Instant::now();
        let secrets = commission(&mut node, now);

        let invoke = InvokeRequest {
            suppress_response: false,
            timed: false,
            invokes: vec![(CommandPath::new(1, 6, 1), TlvValue::Struct(vec![]))],
        };
        node.on_frame(
            udp_binding(),
            &im_frame(&secrets, 100, 5, ImOpcode::InvokeRequest, invoke.encode()),
            now,
        );
        let response = open_frame(&secrets, &take_single(&mut node));
        assert_eq!(response.protocol.opcode, ImOpcode::InvokeResponse.as_byte());

        let read = ReadRequest {
            paths: vec![AttributePath::concrete(1, 6, 0)],
            fabric_filtered: false,
        };
        node.on_frame(
            udp_binding(),
            &im_frame(&secrets, 101, 6, ImOpcode::ReadRequest, read.encode()),
            now,
        );
        let response = open_frame(&secrets, &take_single(&mut node));
        let report = ReportData::decode(&response.payload).unwrap();
        assert!(matches!(
            report.reports[0],
            AttributeReport::Data { value: TlvValue::Bool(true), .. }
        ));
    }

    #[test]
    fn test_subscription_reports_on_change() {
        let mut node = test_node();
        let now = Instant::now();
        let secrets = commission(&mut node, now);

        let subscribe = SubscribeRequest {
            keep_subscriptions: false,
            min_interval: 1,
            max_interval: 60,
            paths: vec![AttributePath::concrete(1, 6, 0)],
            fabric_filtered: false,
        };
        node.on_frame(
            udp_binding(),
            &im_frame(&secrets, 100, 5, ImOpcode::SubscribeRequest, subscribe.encode()),
            now,
        );

        // priming report then subscribe response
        let outbox = node.take_outbox();
        assert_eq!(outbox.len(), 2);
        let priming = open_frame(&secrets, &outbox[0].1);
        assert_eq!(priming.protocol.opcode, ImOpcode::ReportData.as_byte());
        let response = open_frame(&secrets, &outbox[1].1);
        let response = SubscribeResponse::decode(&response.payload).unwrap();
        assert_eq!(response.max_interval, 60);

        // nothing changes: quiet
        node.tick_subscriptions(now + Duration::from_secs(5));
        assert!(node.take_outbox().is_empty());

        // toggle and tick past min interval
        node.data_model_mut()
            .cluster_mut(1, 6)
            .unwrap()
            .invoke(2, &TlvValue::Struct(vec![]), &crate::acl::AccessContext::pase())
            .unwrap();
        node.tick_subscriptions(now + Duration::from_secs(10));
        let frames = node.take_outbox();
        assert_eq!(frames.len(), 1);
        let report = open_frame(&secrets, &frames[0].1);
        let report = ReportData::decode(&report.payload).unwrap();
        assert_eq!(report.subscription_id, Some(response.subscription_id));
        assert!(matches!(
            report.reports[0],
            AttributeReport::Data { value: TlvValue::Bool(true), .. }
        ));
    }

    #[test]
    fn test_replayed_frame_is_not_redelivered() {
        let mut node = test_node();
        let now = Instant::now();
        let secrets = commission(&mut node, now);

        let read = ReadRequest {
            paths: vec![AttributePath::concrete(1, 6, 0)],
            fabric_filtered: false,
        };
        let frame = im_frame(&secrets, 100, 5, ImOpcode::ReadRequest, read.encode());
        node.on_frame(udp_binding(), &frame, now);
        assert_eq!(node.take_outbox().len(), 1);

        // identical replay: no second response
        node.on_frame(udp_binding(), &frame, now);
        assert!(node.take_outbox().is_empty());

        // but the duplicate is re-acknowledged after the piggyback window
        // (before the first MRP retransmit deadline at 300 ms)
        node.poll_timers(now + Duration::from_millis(250));
        let frames = node.take_outbox();
        assert_eq!(frames.len(), 1);
        let ack = open_frame(&secrets, &frames[0].1);
        assert_eq!(ack.protocol.opcode, SecureChannelOpcode::StandaloneAck.as_byte());
        assert_eq!(ack.protocol.ack_counter, Some(100));
    }

    #[test]
    fn test_transport_close_tears_down_sessions() {
        let mut node = test_node();
        let now = Instant::now();
        let secrets = commission(&mut node, now);
        node.take_notifications();

        node.handle_transport_event(
            TransportEvent::Closed { binding: udp_binding() },
            now,
        );
        // UDP close is not connection-oriented here, so emulate TCP teardown
        // with a TCP-bound commissioning instead.
        let _ = secrets;

        let mut tcp_node = test_node();
        let binding = TransportBinding::Tcp(4);
        let mut commissioner = PaseInitiator::new(PASSCODE, 2);
        let request = commissioner.start().unwrap();
        tcp_node.on_frame(
            binding,
            &sc_frame(10, 1, SecureChannelOpcode::PbkdfParamRequest, request),
            now,
        );
        let response = decode_plain(&take_single(&mut tcp_node));
        let pake1 = commissioner.on_pbkdf_param_response(&response.payload).unwrap();
        tcp_node.on_frame(binding, &sc_frame(11, 1, SecureChannelOpcode::Pake1, pake1), now);
        let pake2 = decode_plain(&take_single(&mut tcp_node));
        let pake3 = commissioner.on_pake2(&pake2.payload).unwrap();
        tcp_node.on_frame(binding, &sc_frame(12, 1, SecureChannelOpcode::Pake3, pake3), now);
        take_single(&mut tcp_node);
        let established = tcp_node.take_notifications();
        assert_eq!(established.len(), 1);

        tcp_node.handle_transport_event(TransportEvent::Closed { binding }, now);
        let notifications = tcp_node.take_notifications();
        assert!(matches!(
            notifications.as_slice(),
            [NodeNotification::SessionClosed { .. }]
        ));
    }

    #[test]
    fn test_malformed_frames_dropped_silently() {
        let mut node = test_node();
        let now = Instant::now();
        node.on_frame(udp_binding(), &[], now);
        node.on_frame(udp_binding(), &[0xFF; 3], now);
        node.on_frame(udp_binding(), &[0x30; 64], now);
        assert!(node.take_outbox().is_empty());
        assert!(node.take_notifications().is_empty());
    }

    #[test]
    fn test_unknown_session_frame_dropped() {
        let mut node = test_node();
        let now = Instant::now();
        // plausible header with a session id nothing matches
        let frame = {
            let message = Message {
                header: MessageHeader {
                    session_id: 0x4242,
                    security_flags: SecurityFlags::UNICAST,
                    counter: 1,
                    source_node_id: None,
                    destination: Destination::None,
                },
                protocol: ProtocolHeader::new(1, 2, 3, true),
                payload: vec![],
            };
            let key = crate::crypto::SessionKey::from_bytes([9; 16]);
            encode_secured(&message, &key, 0).unwrap()
        };
        node.on_frame(udp_binding(), &frame, now);
        assert!(node.take_outbox().is_empty());
    }

    #[test]
    fn test_wrong_passcode_commissioner_gets_failure_report() {
        let mut node = test_node();
        let now = Instant::now();
        let binding = udp_binding();
        let mut commissioner = PaseInitiator::new(PASSCODE + 1, 2);

        let request = commissioner.start().unwrap();
        node.on_frame(binding, &sc_frame(10, 1, SecureChannelOpcode::PbkdfParamRequest, request), now);
        let response = decode_plain(&take_single(&mut node));
        let pake1 = commissioner.on_pbkdf_param_response(&response.payload).unwrap();
        node.on_frame(binding, &sc_frame(11, 1, SecureChannelOpcode::Pake1, pake1), now);
        let pake2 = decode_plain(&take_single(&mut node));

        // the commissioner detects the mismatch at cB
        assert!(commissioner.on_pake2(&pake2.payload).is_err());

        // a forged pake3 makes the device fail and report it
        node.on_frame(
            binding,
            &sc_frame(
                12,
                1,
                SecureChannelOpcode::Pake3,
                crate::tlv::encode(&TlvValue::Struct(vec![(
                    1,
                    TlvValue::Bytes(vec![0; 32]),
                )])),
            ),
            now,
        );
        let status = decode_plain(&take_single(&mut node));
        assert_eq!(status.protocol.opcode, SecureChannelOpcode::StatusReport.as_byte());
        let report = StatusReport::from_bytes(&status.payload).unwrap();
        assert!(!report.is_success());
    }
}
