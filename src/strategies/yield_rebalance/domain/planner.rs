use crate::core::types::{Address, RiskTier};

use super::model::{ProtocolQuote, QuoteSnapshot, RebalancePlan, StakedPosition};

/// 按风险等级筛选可选报价，保持快照顺序
pub fn eligible_quotes<'a>(
    risk_tier: RiskTier,
    snapshot: &'a QuoteSnapshot,
) -> impl Iterator<Item = &'a ProtocolQuote> {
    // medium 与 high 使用同一套不过滤的选择
    let stablecoin_only = risk_tier.stablecoin_only();
    snapshot
        .quotes()
        .iter()
        .filter(move |q| !stablecoin_only || q.is_stablecoin)
}

/// 选出APY最高的报价，APY相同时取快照中先出现的
pub fn select_best(risk_tier: RiskTier, snapshot: &QuoteSnapshot) -> Option<&ProtocolQuote> {
    let mut best: Option<&ProtocolQuote> = None;
    for quote in eligible_quotes(risk_tier, snapshot) {
        match best {
            Some(current) if quote.apy <= current.apy => {}
            _ => best = Some(quote),
        }
    }
    best
}

/// 为单个仓位生成调仓计划；已在最优协议或没有可选报价时返回None
pub fn plan(
    position: &StakedPosition,
    risk_tier: RiskTier,
    snapshot: &QuoteSnapshot,
) -> Option<RebalancePlan> {
    let selected = select_best(risk_tier, snapshot)?;

    if selected.protocol_address == position.protocol_address {
        return None;
    }

    Some(RebalancePlan {
        owner: position.owner_address.clone(),
        from_protocol: position.protocol_address.clone(),
        token_in: position.token_address.clone(),
        to_protocol: selected.protocol_address.clone(),
        token_out: selected.token_address.clone(),
        amount: position.amount,
        raw_amount: position.raw_amount,
    })
}

/// 对用户的每个仓位独立规划
pub fn plan_user(
    owner: &Address,
    positions: &[StakedPosition],
    risk_tier: RiskTier,
    snapshot: &QuoteSnapshot,
) -> Vec<RebalancePlan> {
    positions
        .iter()
        .filter(|p| &p.owner_address == owner)
        .filter_map(|p| plan(p, risk_tier, snapshot))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(tail: &str) -> Address {
        Address::parse(&format!("0x{:0>40}", tail)).unwrap()
    }

    const X: &str = "a1";
    const Y: &str = "a2";
    const Z: &str = "a3";
    const USDC: &str = "c1";
    const WETH: &str = "c2";

    fn quote(protocol: &str, token: &str, apy: f64, stable: bool) -> ProtocolQuote {
        ProtocolQuote {
            protocol_address: addr(protocol),
            token_address: addr(token),
            apy,
            is_stablecoin: stable,
        }
    }

    fn sample_snapshot() -> QuoteSnapshot {
        QuoteSnapshot::new(vec![
            quote(X, USDC, 3.0, true),
            quote(Y, USDC, 5.0, true),
            quote(Z, WETH, 9.0, false),
        ])
    }

    fn position_at(protocol: &str) -> StakedPosition {
        StakedPosition {
            owner_address: addr("1"),
            protocol_address: addr(protocol),
            token_address: addr(USDC),
            amount: 100.0,
            raw_amount: 100_000_000,
        }
    }

    #[test]
    fn low_risk_selects_best_stablecoin() {
        let plan = plan(&position_at(X), RiskTier::Low, &sample_snapshot()).unwrap();
        assert_eq!(plan.from_protocol, addr(X));
        assert_eq!(plan.to_protocol, addr(Y));
        assert_eq!(plan.token_in, addr(USDC));
        assert_eq!(plan.token_out, addr(USDC));
        assert_eq!(plan.amount, 100.0);
        assert_eq!(plan.raw_amount, 100_000_000);
    }

    #[test]
    fn high_risk_selects_best_overall() {
        let plan = plan(&position_at(X), RiskTier::High, &sample_snapshot()).unwrap();
        assert_eq!(plan.to_protocol, addr(Z));
        assert_eq!(plan.token_out, addr(WETH));
        assert!(plan.requires_swap());
    }

    #[test]
    fn medium_behaves_like_high() {
        let snapshot = sample_snapshot();
        assert_eq!(
            plan(&position_at(X), RiskTier::Medium, &snapshot),
            plan(&position_at(X), RiskTier::High, &snapshot)
        );
    }

    #[test]
    fn already_optimal_position_yields_no_plan() {
        assert!(plan(&position_at(Y), RiskTier::Low, &sample_snapshot()).is_none());
        assert!(plan(&position_at(Z), RiskTier::High, &sample_snapshot()).is_none());
    }

    #[test]
    fn empty_eligible_set_yields_no_plan() {
        let snapshot = QuoteSnapshot::new(vec![quote(Z, WETH, 9.0, false)]);
        assert!(plan(&position_at(X), RiskTier::Low, &snapshot).is_none());
        assert!(plan(&position_at(X), RiskTier::High, &QuoteSnapshot::new(vec![])).is_none());
    }

    #[test]
    fn ties_resolve_to_first_in_snapshot_order() {
        let snapshot = QuoteSnapshot::new(vec![
            quote(X, USDC, 3.0, true),
            quote(Y, USDC, 7.0, true),
            quote(Z, USDC, 7.0, true),
        ]);
        let best = select_best(RiskTier::Low, &snapshot).unwrap();
        assert_eq!(best.protocol_address, addr(Y));

        let reversed = QuoteSnapshot::new(vec![
            quote(Z, USDC, 7.0, true),
            quote(Y, USDC, 7.0, true),
        ]);
        assert_eq!(
            select_best(RiskTier::Low, &reversed).unwrap().protocol_address,
            addr(Z)
        );
    }

    #[test]
    fn low_risk_never_selects_non_stablecoin() {
        let snapshots = vec![
            sample_snapshot(),
            QuoteSnapshot::new(vec![
                quote(Z, WETH, 50.0, false),
                quote(X, USDC, 0.0, true),
            ]),
            QuoteSnapshot::new(vec![
                quote("b1", WETH, 1.0, false),
                quote("b2", WETH, 2.0, false),
                quote(Y, USDC, 1.5, true),
            ]),
        ];

        for snapshot in &snapshots {
            if let Some(best) = select_best(RiskTier::Low, snapshot) {
                assert!(best.is_stablecoin);
            }
            for start in [X, Y, Z, "b1"] {
                if let Some(plan) = plan(&position_at(start), RiskTier::Low, snapshot) {
                    let target = snapshot.get(&plan.to_protocol).unwrap();
                    assert!(target.is_stablecoin);
                }
            }
        }
    }

    #[test]
    fn plan_is_none_iff_empty_or_already_best() {
        let snapshot = sample_snapshot();
        for tier in [RiskTier::Low, RiskTier::Medium, RiskTier::High] {
            for start in [X, Y, Z, "ff"] {
                let position = position_at(start);
                let best = select_best(tier, &snapshot);
                let expected_none = match best {
                    None => true,
                    Some(q) => q.protocol_address == position.protocol_address,
                };
                assert_eq!(plan(&position, tier, &snapshot).is_none(), expected_none);
            }
        }
    }

    #[test]
    fn planning_is_deterministic() {
        let snapshot = sample_snapshot();
        let first = plan(&position_at(X), RiskTier::High, &snapshot);
        let second = plan(&position_at(X), RiskTier::High, &snapshot);
        assert_eq!(first, second);
    }

    #[test]
    fn executed_plan_is_idempotent_on_next_cycle() {
        let snapshot = sample_snapshot();
        let first = plan(&position_at(X), RiskTier::Low, &snapshot).unwrap();

        let moved = StakedPosition {
            owner_address: first.owner.clone(),
            protocol_address: first.to_protocol.clone(),
            token_address: first.token_out.clone(),
            amount: first.amount,
            raw_amount: first.raw_amount,
        };
        assert!(plan(&moved, RiskTier::Low, &snapshot).is_none());
    }

    #[test]
    fn each_position_is_planned_independently() {
        let owner = addr("1");
        let positions = vec![position_at(X), position_at(Y), position_at(Z)];
        let plans = plan_user(&owner, &positions, RiskTier::Low, &sample_snapshot());

        // X 与 Z 需要迁移到 Y，Y 已是最优
        assert_eq!(plans.len(), 2);
        assert!(plans.iter().all(|p| p.to_protocol == addr(Y)));
        assert!(plans.iter().all(|p| p.from_protocol != p.to_protocol));
    }
}
