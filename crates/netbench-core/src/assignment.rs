use netbench_abstract::{ClientTrafficAssignment, TrafficMode, TrafficShape, TransportKind};

/// Pick the transport and traffic shape for one client.
///
/// Mixed mode alternates by index parity (even = CBR, odd = bulk) so that the
/// same client count always yields the same assignment.
pub fn assign(client: u32, mode: TrafficMode) -> ClientTrafficAssignment {
    let transport = match mode {
        TrafficMode::Cbr => TransportKind::UdpCbr,
        TrafficMode::Bulk => TransportKind::TcpBulk,
        TrafficMode::Mixed if client % 2 == 0 => TransportKind::UdpCbr,
        TrafficMode::Mixed => TransportKind::TcpBulk,
    };
    let shape = match transport {
        TransportKind::UdpCbr => TrafficShape::cbr(),
        TransportKind::TcpBulk => TrafficShape::bulk(),
    };
    ClientTrafficAssignment {
        client,
        transport,
        shape,
    }
}

/// Assignments for clients `0..clients`, in index order.
pub fn assign_all(clients: u32, mode: TrafficMode) -> Vec<ClientTrafficAssignment> {
    (0..clients).map(|i| assign(i, mode)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn mixed_alternates_by_parity() {
        let kinds: Vec<_> = assign_all(4, TrafficMode::Mixed)
            .iter()
            .map(|a| a.transport)
            .collect();
        assert_eq!(
            kinds,
            vec![
                TransportKind::UdpCbr,
                TransportKind::TcpBulk,
                TransportKind::UdpCbr,
                TransportKind::TcpBulk,
            ]
        );
    }

    #[test]
    fn uniform_modes_never_mix() {
        assert!(
            assign_all(17, TrafficMode::Cbr)
                .iter()
                .all(|a| a.transport == TransportKind::UdpCbr)
        );
        assert!(
            assign_all(17, TrafficMode::Bulk)
                .iter()
                .all(|a| a.transport == TransportKind::TcpBulk)
        );
    }

    #[test]
    fn assignment_is_pure() {
        for mode in TrafficMode::ALL {
            assert_eq!(assign_all(9, mode), assign_all(9, mode));
        }
    }

    #[test]
    fn shapes_and_ports() {
        let udp = assign(0, TrafficMode::Cbr);
        assert_eq!(
            udp.shape,
            TrafficShape::ConstantRate {
                rate_bps: 512_000,
                payload_bytes: 512,
                on_fraction: 1.0
            }
        );
        assert_eq!(udp.port(), Some(9));

        let tcp = assign(3, TrafficMode::Bulk);
        assert_eq!(
            tcp.shape,
            TrafficShape::Bulk {
                max_bytes: None,
                send_size: 1500
            }
        );
        assert_eq!(tcp.port(), Some(12));
        assert_eq!(tcp.describe(), "Bulk (TCP) - 1500 bytes");
    }

    #[test]
    fn zero_clients_is_empty() {
        assert!(assign_all(0, TrafficMode::Mixed).is_empty());
    }

    fn arb_mode() -> impl Strategy<Value = TrafficMode> {
        prop::sample::select(TrafficMode::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn mixed_parity_holds_for_any_index(client in any::<u32>()) {
            let a = assign(client, TrafficMode::Mixed);
            let expected = if client % 2 == 0 {
                TransportKind::UdpCbr
            } else {
                TransportKind::TcpBulk
            };
            prop_assert_eq!(a.transport, expected);
            prop_assert_eq!(a.client, client);
        }

        #[test]
        fn assignment_is_pure_for_any_input(client in any::<u32>(), mode in arb_mode()) {
            prop_assert_eq!(assign(client, mode), assign(client, mode));
        }

        #[test]
        fn assign_all_covers_every_index(n in 0u32..512, mode in arb_mode()) {
            let all = assign_all(n, mode);
            prop_assert_eq!(all.len(), n as usize);
            for (i, a) in all.iter().enumerate() {
                prop_assert_eq!(*a, assign(i as u32, mode));
            }
        }
    }
}
