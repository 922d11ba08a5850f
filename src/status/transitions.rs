use super::GatewayStatus;

/// Whether moving a payment from `from` to `to` is allowed for an
/// asynchronous (webhook) write. Redelivered or out-of-order notifications
/// must never walk a payment backwards, so anything not listed is skipped.
pub fn is_forward(from: Option<GatewayStatus>, to: GatewayStatus) -> bool {
    use GatewayStatus as G;
    let Some(from) = from else {
        return true;
    };
    match from {
        G::Requested => to != G::Requested,
        G::Pending => !matches!(to, G::Requested | G::Pending),
        G::Authorize => matches!(to, G::Paid | G::PartialPaid | G::Cancelled | G::Failed),
        // a further partial capture reports the new captured total
        G::PartialPaid => matches!(to, G::Paid | G::PartialPaid | G::PartialRefund | G::Refunded | G::Cancelled),
        G::Paid => matches!(to, G::PartialRefund | G::Refunded | G::Cancelled),
        // successive partial refunds are distinct events
        G::PartialRefund => matches!(to, G::PartialRefund | G::Refunded),
        G::Refunded | G::Cancelled | G::Failed => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use GatewayStatus as G;

    #[test]
    fn unset_status_accepts_anything() {
        for to in G::ALL {
            assert!(is_forward(None, to));
        }
    }

    #[test]
    fn pending_moves_forward() {
        assert!(is_forward(Some(G::Pending), G::Paid));
        assert!(is_forward(Some(G::Pending), G::Failed));
        assert!(is_forward(Some(G::Requested), G::Pending));
        assert!(!is_forward(Some(G::Pending), G::Pending));
    }

    #[test]
    fn paid_cannot_go_back() {
        assert!(!is_forward(Some(G::Paid), G::Pending));
        assert!(!is_forward(Some(G::Paid), G::Authorize));
        assert!(!is_forward(Some(G::Paid), G::Paid));
        assert!(is_forward(Some(G::Paid), G::Refunded));
    }

    #[test]
    fn terminal_states_are_final() {
        for from in [G::Refunded, G::Cancelled, G::Failed] {
            for to in G::ALL {
                assert!(!is_forward(Some(from), to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn partial_captures_can_follow_each_other() {
        assert!(is_forward(Some(G::PartialPaid), G::PartialPaid));
        assert!(is_forward(Some(G::PartialPaid), G::Paid));
        assert!(!is_forward(Some(G::PartialPaid), G::Authorize));
    }

    #[test]
    fn partial_refunds_accumulate() {
        assert!(is_forward(Some(G::PartialRefund), G::PartialRefund));
        assert!(is_forward(Some(G::PartialRefund), G::Refunded));
        assert!(!is_forward(Some(G::PartialRefund), G::Paid));
    }
}
