//! Consolidated Reports
//!
//! P&L, cash flow and performance across every account of one analytics
//! run. Aggregation is a plain sum over per-account figures, so each
//! cross-account total equals the sum of the matching per-account values,
//! and accounts with no operations still appear as zero-valued entries.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::ledger::{ExpenseBreakdown, OperationLedger};
use crate::model::{OperationKind, PortfolioSnapshot};

/// Realized P&L for one account.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountPnl {
    pub account_name: String,
    pub total_pnl: Decimal,
    /// Signed payments grouped by FIGI. Cash movements without an
    /// instrument only count toward the totals.
    pub by_instrument: BTreeMap<String, Decimal>,
    pub by_kind: BTreeMap<OperationKind, Decimal>,
    pub degraded: bool,
}

/// Realized P&L across all accounts.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PnlReport {
    pub total_pnl: Decimal,
    pub by_account: BTreeMap<String, AccountPnl>,
    pub total_by_instrument: BTreeMap<String, Decimal>,
    pub total_by_kind: BTreeMap<OperationKind, Decimal>,
}

/// Signed sum and operation count of one kind.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindFlow {
    pub sum: Decimal,
    pub count: u32,
}

/// Cash flow for one account.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountCashFlow {
    pub account_name: String,
    pub inflow: Decimal,
    pub outflow: Decimal,
    pub net_flow: Decimal,
    pub by_kind: BTreeMap<OperationKind, KindFlow>,
    pub expenses: ExpenseBreakdown,
    pub degraded: bool,
}

/// One row of the cross-account expense ranking.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountExpenseComparison {
    pub account_id: String,
    pub account_name: String,
    pub total_expenses: Decimal,
    /// Share of the expenses of all ranked accounts, percent.
    pub percentage_of_total: Decimal,
    pub expenses: ExpenseBreakdown,
}

/// Cash flow across all accounts.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CashFlowReport {
    pub total_inflow: Decimal,
    pub total_outflow: Decimal,
    pub total_net_flow: Decimal,
    pub by_account: BTreeMap<String, AccountCashFlow>,
    pub total_by_kind: BTreeMap<OperationKind, KindFlow>,
    pub total_expenses: ExpenseBreakdown,
    /// Accounts ranked descending by total expenses. Accounts without
    /// expenses are omitted from the ranking.
    pub accounts_comparison: Vec<AccountExpenseComparison>,
}

/// Invested-vs-current performance for one account.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountPerformance {
    pub account_name: String,
    pub total_invested: Decimal,
    pub current_value: Decimal,
    pub total_return: Decimal,
    pub return_percentage: Decimal,
    pub degraded: bool,
}

/// Performance across all accounts. The aggregate percentage is computed
/// from aggregate invested capital, not averaged over accounts.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub total_invested: Decimal,
    pub total_current_value: Decimal,
    pub total_return: Decimal,
    pub total_return_percentage: Decimal,
    pub by_account: BTreeMap<String, AccountPerformance>,
}

/// Pure report computation over already-fetched data.
pub struct AnalyticsEngine;

impl AnalyticsEngine {
    /// Realized P&L: signed payment sums per instrument, kind and account.
    pub fn pnl(ledger: &OperationLedger) -> PnlReport {
        let mut report = PnlReport::default();

        for entry in ledger.accounts() {
            let mut account_pnl = AccountPnl {
                account_name: entry.account.name.clone(),
                total_pnl: Decimal::ZERO,
                by_instrument: BTreeMap::new(),
                by_kind: BTreeMap::new(),
                degraded: entry.degraded,
            };

            for op in &entry.operations {
                account_pnl.total_pnl += op.payment;
                if let Some(figi) = &op.figi {
                    *account_pnl
                        .by_instrument
                        .entry(figi.clone())
                        .or_insert(Decimal::ZERO) += op.payment;
                }
                *account_pnl.by_kind.entry(op.kind).or_insert(Decimal::ZERO) += op.payment;
            }

            report.total_pnl += account_pnl.total_pnl;
            for (figi, amount) in &account_pnl.by_instrument {
                *report
                    .total_by_instrument
                    .entry(figi.clone())
                    .or_insert(Decimal::ZERO) += *amount;
            }
            for (kind, amount) in &account_pnl.by_kind {
                *report.total_by_kind.entry(*kind).or_insert(Decimal::ZERO) += *amount;
            }
            report.by_account.insert(entry.account.id.clone(), account_pnl);
        }

        report
    }

    /// Cash flow: inflow, outflow, per-kind flows and expense breakdowns.
    pub fn cash_flow(ledger: &OperationLedger) -> CashFlowReport {
        let mut report = CashFlowReport::default();
        let mut ranked: Vec<AccountExpenseComparison> = Vec::new();

        for entry in ledger.accounts() {
            let mut inflow = Decimal::ZERO;
            let mut outflow = Decimal::ZERO;
            let mut by_kind: BTreeMap<OperationKind, KindFlow> = BTreeMap::new();

            for op in &entry.operations {
                if op.payment > Decimal::ZERO {
                    inflow += op.payment;
                } else {
                    outflow += op.payment.abs();
                }
                let flow = by_kind.entry(op.kind).or_default();
                flow.sum += op.payment;
                flow.count += 1;
            }

            let expenses = ExpenseBreakdown::of(&entry.operations);

            report.total_inflow += inflow;
            report.total_outflow += outflow;
            for (kind, flow) in &by_kind {
                let total = report.total_by_kind.entry(*kind).or_default();
                total.sum += flow.sum;
                total.count += flow.count;
            }
            report.total_expenses.accumulate(&expenses);

            if expenses.total_expenses > Decimal::ZERO {
                ranked.push(AccountExpenseComparison {
                    account_id: entry.account.id.clone(),
                    account_name: entry.account.name.clone(),
                    total_expenses: expenses.total_expenses,
                    percentage_of_total: Decimal::ZERO,
                    expenses: expenses.clone(),
                });
            }

            report.by_account.insert(
                entry.account.id.clone(),
                AccountCashFlow {
                    account_name: entry.account.name.clone(),
                    inflow,
                    outflow,
                    net_flow: inflow - outflow,
                    by_kind,
                    expenses,
                    degraded: entry.degraded,
                },
            );
        }

        report.total_net_flow = report.total_inflow - report.total_outflow;
        report.total_expenses.recompute_percentages();

        ranked.sort_by(|a, b| b.total_expenses.cmp(&a.total_expenses));
        let ranked_total: Decimal = ranked.iter().map(|c| c.total_expenses).sum();
        if ranked_total > Decimal::ZERO {
            for comparison in &mut ranked {
                comparison.percentage_of_total =
                    (comparison.total_expenses / ranked_total * dec!(100)).round_dp(2);
            }
        }
        report.accounts_comparison = ranked;

        report
    }

    /// Performance: invested capital against current portfolio value.
    pub fn performance(
        ledger: &OperationLedger,
        portfolios: &BTreeMap<String, PortfolioSnapshot>,
    ) -> PerformanceReport {
        let mut report = PerformanceReport::default();

        for entry in ledger.accounts() {
            let invested: Decimal = entry
                .operations
                .iter()
                .filter(|op| op.payment < Decimal::ZERO)
                .map(|op| op.payment.abs())
                .sum();

            let snapshot = portfolios.get(&entry.account.id);
            let current_value = snapshot
                .map(|s| s.total_amount.value)
                .unwrap_or(Decimal::ZERO);
            let degraded = entry.degraded || snapshot.is_none_or(|s| s.degraded);

            let total_return = current_value - invested;
            let return_percentage = if invested == Decimal::ZERO {
                Decimal::ZERO
            } else {
                (total_return / invested * dec!(100)).round_dp(2)
            };

            report.total_invested += invested;
            report.total_current_value += current_value;
            report.by_account.insert(
                entry.account.id.clone(),
                AccountPerformance {
                    account_name: entry.account.name.clone(),
                    total_invested: invested,
                    current_value,
                    total_return,
                    return_percentage,
                    degraded,
                },
            );
        }

        report.total_return = report.total_current_value - report.total_invested;
        report.total_return_percentage = if report.total_invested == Decimal::ZERO {
            Decimal::ZERO
        } else {
            (report.total_return / report.total_invested * dec!(100)).round_dp(2)
        };

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::AccountOperations;
    use crate::model::{Account, Money, Operation};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn account(id: &str, name: &str) -> Account {
        Account {
            id: id.into(),
            name: name.into(),
            kind: "broker".into(),
            status: "open".into(),
            opened_date: None,
            closed_date: None,
        }
    }

    /// The worked example: two buys, one sale, a dividend and a coupon.
    fn example_ledger() -> OperationLedger {
        let acc = account("acc-1", "Main");
        let now = Utc::now();
        let mut ledger = OperationLedger::new();
        ledger.insert(AccountOperations {
            operations: vec![
                Operation::new(&acc, "Buy securities", now, dec!(-1500), "USD")
                    .with_instrument("FG0000AAAA01", 10, dec!(150)),
                Operation::new(&acc, "Buy securities", now, dec!(-2000), "USD")
                    .with_instrument("FG0000BBBB02", 20, dec!(100)),
                Operation::new(&acc, "Sell securities", now, dec!(777.50), "USD")
                    .with_instrument("FG0000AAAA01", 5, dec!(155.50)),
                Operation::new(&acc, "Dividend payment", now, dec!(25), "USD")
                    .with_instrument("FG0000AAAA01", 0, Decimal::ZERO),
                Operation::new(&acc, "Coupon payment", now, dec!(250), "USD")
                    .with_instrument("FG0000CCCC03", 0, Decimal::ZERO),
            ],
            account: acc,
            degraded: false,
        });
        ledger
    }

    #[test]
    fn test_pnl_worked_example() {
        let report = AnalyticsEngine::pnl(&example_ledger());
        assert_eq!(report.total_pnl, dec!(-2447.50));

        let acc = &report.by_account["acc-1"];
        assert_eq!(acc.total_pnl, dec!(-2447.50));
        // -1500 + 777.50 + 25 on the first instrument.
        assert_eq!(acc.by_instrument["FG0000AAAA01"], dec!(-697.50));
        assert_eq!(acc.by_kind[&OperationKind::Purchase], dec!(-3500));
        assert_eq!(acc.by_kind[&OperationKind::Coupon], dec!(250));
    }

    #[test]
    fn test_cash_flow_worked_example() {
        let report = AnalyticsEngine::cash_flow(&example_ledger());
        assert_eq!(report.total_inflow, dec!(1052.50));
        assert_eq!(report.total_outflow, dec!(3500.00));
        assert_eq!(report.total_net_flow, dec!(-2447.50));

        let acc = &report.by_account["acc-1"];
        assert_eq!(acc.inflow - acc.outflow, acc.net_flow);
        assert_eq!(acc.by_kind[&OperationKind::Purchase].count, 2);
        assert_eq!(acc.expenses.investments.sum, dec!(3500));
    }

    fn two_account_ledger() -> OperationLedger {
        let acc_a = account("acc-a", "Alpha");
        let acc_b = account("acc-b", "Beta");
        let acc_c = account("acc-c", "Gamma");
        let now = Utc::now();

        let mut ledger = OperationLedger::new();
        ledger.insert(AccountOperations {
            operations: vec![
                Operation::new(&acc_a, "Buy securities", now, dec!(-1000), "USD")
                    .with_instrument("FG0000AAAA01", 10, dec!(100)),
                Operation::new(&acc_a, "Brokerage commission withheld", now, dec!(-10), "USD"),
            ],
            account: acc_a,
            degraded: false,
        });
        ledger.insert(AccountOperations {
            operations: vec![
                Operation::new(&acc_b, "Buy securities", now, dec!(-3000), "USD")
                    .with_instrument("FG0000AAAA01", 30, dec!(100)),
                Operation::new(&acc_b, "Dividend payment", now, dec!(120), "USD")
                    .with_instrument("FG0000AAAA01", 0, Decimal::ZERO),
            ],
            account: acc_b,
            degraded: false,
        });
        // An account with no operations still gets zero-valued entries.
        ledger.insert(AccountOperations {
            operations: vec![],
            account: acc_c,
            degraded: false,
        });
        ledger
    }

    #[test]
    fn test_aggregates_equal_sum_of_accounts() {
        let ledger = two_account_ledger();

        let pnl = AnalyticsEngine::pnl(&ledger);
        let per_account: Decimal = pnl.by_account.values().map(|a| a.total_pnl).sum();
        assert_eq!(pnl.total_pnl, per_account);
        // Element-wise cross-account sum for the shared instrument.
        assert_eq!(pnl.total_by_instrument["FG0000AAAA01"], dec!(-3880));

        let flow = AnalyticsEngine::cash_flow(&ledger);
        let inflow: Decimal = flow.by_account.values().map(|a| a.inflow).sum();
        let outflow: Decimal = flow.by_account.values().map(|a| a.outflow).sum();
        assert_eq!(flow.total_inflow, inflow);
        assert_eq!(flow.total_outflow, outflow);
        assert_eq!(flow.total_net_flow, inflow - outflow);
    }

    #[test]
    fn test_empty_account_emits_zero_entries() {
        let ledger = two_account_ledger();
        let pnl = AnalyticsEngine::pnl(&ledger);
        let empty = &pnl.by_account["acc-c"];
        assert_eq!(empty.total_pnl, Decimal::ZERO);
        assert!(empty.by_instrument.is_empty());

        let flow = AnalyticsEngine::cash_flow(&ledger);
        assert_eq!(flow.by_account["acc-c"].net_flow, Decimal::ZERO);
        assert_eq!(flow.by_account["acc-c"].expenses.total_expenses, Decimal::ZERO);
    }

    #[test]
    fn test_expense_ranking_descending_with_shares() {
        let flow = AnalyticsEngine::cash_flow(&two_account_ledger());
        let ranking = &flow.accounts_comparison;

        // Gamma has no expenses and is not ranked.
        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking[0].account_id, "acc-b");
        assert!(ranking[0].total_expenses >= ranking[1].total_expenses);

        let shares: Decimal = ranking.iter().map(|c| c.percentage_of_total).sum();
        assert!((shares - dec!(100)).abs() <= dec!(0.02));
    }

    fn snapshot(account: &Account, value: Decimal) -> PortfolioSnapshot {
        PortfolioSnapshot::new(account, Money::new("USD", value), vec![])
    }

    #[test]
    fn test_performance_aggregates_from_invested_capital() {
        let ledger = two_account_ledger();
        let acc_a = account("acc-a", "Alpha");
        let acc_b = account("acc-b", "Beta");
        let acc_c = account("acc-c", "Gamma");

        let mut portfolios = BTreeMap::new();
        portfolios.insert("acc-a".to_string(), snapshot(&acc_a, dec!(1111)));
        portfolios.insert("acc-b".to_string(), snapshot(&acc_b, dec!(3150)));
        portfolios.insert("acc-c".to_string(), snapshot(&acc_c, dec!(0)));

        let report = AnalyticsEngine::performance(&ledger, &portfolios);

        // Alpha invested 1010, Beta 3000.
        assert_eq!(report.total_invested, dec!(4010));
        assert_eq!(report.total_current_value, dec!(4261));
        assert_eq!(report.total_return, dec!(251));
        // Aggregate percentage comes from aggregate invested capital, not
        // from averaging the per-account percentages.
        assert_eq!(
            report.total_return_percentage,
            (dec!(251) / dec!(4010) * dec!(100)).round_dp(2)
        );

        // Zero invested never divides.
        assert_eq!(report.by_account["acc-c"].return_percentage, Decimal::ZERO);
    }

    #[test]
    fn test_failed_portfolio_reads_as_full_loss() {
        let acc = account("acc-a", "Alpha");
        let now = Utc::now();
        let mut ledger = OperationLedger::new();
        ledger.insert(AccountOperations {
            operations: vec![
                Operation::new(&acc, "Buy securities", now, dec!(-2500), "USD")
                    .with_instrument("FG0000AAAA01", 25, dec!(100)),
            ],
            account: acc.clone(),
            degraded: false,
        });

        let mut portfolios = BTreeMap::new();
        portfolios.insert("acc-a".to_string(), PortfolioSnapshot::unavailable(&acc, "USD"));

        let report = AnalyticsEngine::performance(&ledger, &portfolios);
        let perf = &report.by_account["acc-a"];
        assert_eq!(perf.current_value, Decimal::ZERO);
        assert_eq!(perf.total_return, dec!(-2500));
        assert_eq!(perf.return_percentage, dec!(-100));
        assert!(perf.degraded);
    }
}
