use anyhow::{anyhow, Result};
use chrono::{Datelike, Duration, Months, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::db::Database;
use crate::models::{
    DashboardKpis, FinancialSummaryView, InstructorPayment, MemberDistribution, MonthlyFinancial,
};

/// Normalizes any date within a month to its [first_day, last_day] window.
pub fn month_bounds(day: NaiveDate) -> Result<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(day.year(), day.month(), 1)
        .ok_or_else(|| anyhow!("Invalid period date: {}", day))?;
    let next_first = first
        .checked_add_months(Months::new(1))
        .ok_or_else(|| anyhow!("Period month out of range: {}", day))?;
    Ok((first, next_first - Duration::days(1)))
}

/// Currency rounding applied to every stored amount, not only final output.
fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Computes one payment record per active instructor with hours in the
/// target month. Keyed by (instructor, first_day): re-running with
/// unchanged inputs reproduces identical rows. Instructors with zero
/// hours get no record at all, which is distinct from being paid zero.
///
/// Rows are written one at a time; a failure mid-loop leaves earlier
/// instructors updated and the rest untouched. Safe to re-invoke.
pub fn calculate_instructor_payments(
    db: &Database,
    period_month: NaiveDate,
) -> Result<Vec<InstructorPayment>> {
    let (first, last) = month_bounds(period_month)?;

    let mut payments = Vec::new();
    for instructor in db.active_instructors()? {
        let total_hours = db.hours_taught_between(instructor.id, first, last)?;
        if total_hours <= Decimal::ZERO {
            continue;
        }

        // Rate and tax are snapshotted now; later registry changes must
        // not alter this month's figures unless it is recalculated.
        let gross = round_money(total_hours * instructor.hourly_rate);
        let tax = round_money(gross * instructor.tax_rate_percentage / Decimal::ONE_HUNDRED);
        let net = round_money(gross - tax);

        let payment = db.upsert_instructor_payment(
            instructor.id,
            first,
            total_hours,
            instructor.hourly_rate,
            gross,
            tax,
            net,
        )?;
        payments.push(payment);
    }

    Ok(payments)
}

/// Settles one calendar month: revenue from paid student payments,
/// expenses from settled instructor pay plus paid operational expenses,
/// then the profit split. Triggers member allocation when there is
/// distributable profit. Finalized months are immutable.
///
/// A re-settlement that drops distributable profit to zero or below
/// skips the allocator, leaving any distribution rows from the prior
/// run in place with their old amounts. Board review is expected to
/// cancel them before payout.
pub fn calculate_monthly_profit(
    db: &Database,
    period_month: NaiveDate,
    retained_earnings_percentage: u32,
) -> Result<MonthlyFinancial> {
    let (first, last) = month_bounds(period_month)?;

    if let Some(existing) = db.get_monthly_financial(first)? {
        if existing.is_finalized {
            return Err(anyhow!(
                "Financial summary for {} is finalized and cannot be recalculated",
                first.format("%B %Y")
            ));
        }
    }

    let total_revenue = db.revenue_between(first, last)?;
    let instructor_payments = db.instructor_payments_total(first)?;
    let operational_expenses = db.operational_expenses_for(first)?;
    let other_expenses = Decimal::ZERO;

    let total_expenses = round_money(instructor_payments + operational_expenses + other_expenses);
    // May be negative; there is no floor at zero
    let gross_profit = round_money(total_revenue - total_expenses);

    let retained_earnings = round_money(
        gross_profit * Decimal::from(retained_earnings_percentage) / Decimal::ONE_HUNDRED,
    );
    let distributable_profit = round_money(gross_profit - retained_earnings);

    let summary = db.upsert_monthly_financial(
        first,
        total_revenue,
        instructor_payments,
        operational_expenses,
        other_expenses,
        total_expenses,
        gross_profit,
        retained_earnings,
        distributable_profit,
    )?;

    // No negative payouts: allocation only runs on positive profit
    if summary.distributable_profit > Decimal::ZERO {
        allocate_member_distributions(db, &summary)?;
    }

    Ok(summary)
}

/// Allocates the distributable pool across active members. Each member's
/// share_percentage is an absolute percentage of the pool; the roster is
/// expected to sum to 100, and the total is checked only to guard the
/// empty-roster case. Public employees get a row with a computed amount
/// but a cancelled status, so the exclusion is visible in the ledger.
pub fn allocate_member_distributions(
    db: &Database,
    summary: &MonthlyFinancial,
) -> Result<Vec<MemberDistribution>> {
    let members = db.active_members()?;

    let total_shares: Decimal = members.iter().map(|m| m.share_percentage).sum();
    if total_shares == Decimal::ZERO {
        return Ok(Vec::new());
    }

    let mut distributions = Vec::new();
    for member in &members {
        let amount =
            round_money(summary.distributable_profit * member.share_percentage / Decimal::ONE_HUNDRED);
        let status = if member.can_receive_profit() {
            "pending"
        } else {
            "cancelled"
        };
        let distribution = db.upsert_member_distribution(
            member.id,
            summary.id,
            member.share_percentage,
            amount,
            status,
            member.employment_status == "public",
        )?;
        distributions.push(distribution);
    }

    Ok(distributions)
}

/// Read-only projection of a month's settlement; None if not yet settled.
pub fn get_financial_summary(
    db: &Database,
    period_month: NaiveDate,
) -> Result<Option<FinancialSummaryView>> {
    let (first, _) = month_bounds(period_month)?;
    let Some(summary) = db.get_monthly_financial(first)? else {
        return Ok(None);
    };
    Ok(Some(FinancialSummaryView {
        period: first.format("%B %Y").to_string(),
        total_revenue: summary.total_revenue,
        total_expenses: summary.total_expenses,
        gross_profit: summary.gross_profit,
        retained_earnings: summary.retained_earnings,
        distributable_profit: summary.distributable_profit,
        profit_margin: summary.profit_margin(),
        is_finalized: summary.is_finalized,
    }))
}

/// Point-in-time dashboard counts, independent of the settlement pipeline.
pub fn dashboard_kpis(db: &Database, today: NaiveDate) -> Result<DashboardKpis> {
    let (current_month, _) = month_bounds(today)?;
    let current_summary = db.get_monthly_financial(current_month)?;
    let (pending_count, pending_amount) = db.pending_overdue_payments(today)?;

    Ok(DashboardKpis {
        total_students: db.count_active_students()?,
        total_courses: db.count_active_courses()?,
        total_enrollments: db.count_active_enrollments()?,
        pending_payments_count: pending_count,
        pending_payments_amount: pending_amount,
        current_month_revenue: current_summary
            .as_ref()
            .map(|s| s.total_revenue)
            .unwrap_or(Decimal::ZERO),
        current_month_profit: current_summary
            .as_ref()
            .map(|s| s.gross_profit)
            .unwrap_or(Decimal::ZERO),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        db
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    /// Instructor teaching `hours` in August 2026 at the given rate/tax.
    fn seed_instructor(db: &Database, name: &str, rate: &str, tax: &str, hours: &str) -> i64 {
        let instructor = db.add_instructor(name, dec(rate), dec(tax)).unwrap();
        let course = db
            .add_course(
                &format!("{} course", name),
                date(2026, 8, 1),
                date(2026, 12, 20),
            )
            .unwrap();
        db.assign_instructor(course, instructor, true).unwrap();
        db.log_hours(course, instructor, dec(hours)).unwrap();
        instructor
    }

    #[test]
    fn test_month_bounds_normalizes_mid_month() {
        let (first, last) = month_bounds(date(2026, 8, 27)).unwrap();
        assert_eq!(first, date(2026, 8, 1));
        assert_eq!(last, date(2026, 8, 31));
    }

    #[test]
    fn test_month_bounds_december_rollover() {
        let (first, last) = month_bounds(date(2026, 12, 15)).unwrap();
        assert_eq!(first, date(2026, 12, 1));
        assert_eq!(last, date(2026, 12, 31));
    }

    #[test]
    fn test_month_bounds_february() {
        let (_, last) = month_bounds(date(2026, 2, 10)).unwrap();
        assert_eq!(last, date(2026, 2, 28));
    }

    #[test]
    fn test_instructor_payment_amounts() {
        let db = test_db();
        seed_instructor(&db, "Sara Idrissi", "150.00", "10", "40");

        let payments = calculate_instructor_payments(&db, date(2026, 8, 15)).unwrap();
        assert_eq!(payments.len(), 1);

        let p = &payments[0];
        assert_eq!(p.period_month, date(2026, 8, 1));
        assert_eq!(p.total_hours, dec("40"));
        assert_eq!(p.hourly_rate, dec("150.00"));
        assert_eq!(p.gross_amount, dec("6000.00"));
        assert_eq!(p.tax_amount, dec("600.00"));
        assert_eq!(p.net_amount, dec("5400.00"));
        assert_eq!(p.status, "pending");
    }

    #[test]
    fn test_zero_hours_produces_no_record() {
        let db = test_db();
        // Assigned but never taught
        let instructor = db
            .add_instructor("Omar Tazi", dec("200"), dec("10"))
            .unwrap();
        let course = db
            .add_course("Algebra", date(2026, 8, 1), date(2026, 12, 20))
            .unwrap();
        db.assign_instructor(course, instructor, true).unwrap();

        let payments = calculate_instructor_payments(&db, date(2026, 8, 1)).unwrap();
        assert!(payments.is_empty());
        assert!(db
            .get_instructor_payment(instructor, date(2026, 8, 1))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_inactive_instructors_are_skipped() {
        let db = test_db();
        let instructor = seed_instructor(&db, "Sara Idrissi", "150", "10", "40");
        db.set_instructor_status(instructor, "inactive").unwrap();

        let payments = calculate_instructor_payments(&db, date(2026, 8, 1)).unwrap();
        assert!(payments.is_empty());
    }

    #[test]
    fn test_recalculation_is_idempotent() {
        let db = test_db();
        seed_instructor(&db, "Sara Idrissi", "150.00", "10", "40");

        let first = calculate_instructor_payments(&db, date(2026, 8, 1)).unwrap();
        let second = calculate_instructor_payments(&db, date(2026, 8, 1)).unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(first[0].gross_amount, second[0].gross_amount);
        assert_eq!(first[0].tax_amount, second[0].tax_amount);
        assert_eq!(first[0].net_amount, second[0].net_amount);
        assert_eq!(db.list_instructor_payments(date(2026, 8, 1)).unwrap().len(), 1);
    }

    #[test]
    fn test_recalculation_takes_fresh_rate_snapshot() {
        let db = test_db();
        let instructor = seed_instructor(&db, "Sara Idrissi", "100", "0", "10");

        let before = calculate_instructor_payments(&db, date(2026, 8, 1)).unwrap();
        assert_eq!(before[0].hourly_rate, dec("100"));
        assert_eq!(before[0].gross_amount, dec("1000.00"));

        // A rate change alone does not touch the stored row
        db.set_instructor_rate(instructor, dec("120")).unwrap();
        let stored = db
            .get_instructor_payment(instructor, date(2026, 8, 1))
            .unwrap()
            .unwrap();
        assert_eq!(stored.hourly_rate, dec("100"));

        // Recalculation snapshots the new rate
        let after = calculate_instructor_payments(&db, date(2026, 8, 1)).unwrap();
        assert_eq!(after[0].hourly_rate, dec("120"));
        assert_eq!(after[0].gross_amount, dec("1200.00"));
    }

    /// Seeds August 2026 with revenue 100000, approved instructor pay
    /// 30000 and paid operational expenses 10000.
    fn seed_settlement_month(db: &Database) {
        let instructor = seed_instructor(db, "Sara Idrissi", "150", "0", "200");
        let payments = calculate_instructor_payments(db, date(2026, 8, 1)).unwrap();
        assert_eq!(payments[0].net_amount, dec("30000.00"));
        assert_eq!(payments[0].instructor_id, instructor);
        db.set_instructor_payment_status(payments[0].id, "approved")
            .unwrap();

        let student = db.add_student("Amina Alaoui").unwrap();
        let tuition = db
            .add_payment(student, dec("100000"), date(2026, 8, 10))
            .unwrap();
        db.mark_payment_paid(tuition, None, date(2026, 8, 10)).unwrap();

        let rent = db
            .add_expense("rent", "August rent", dec("10000"), date(2026, 8, 3), date(2026, 8, 1))
            .unwrap();
        db.set_expense_status(rent, "paid").unwrap();
    }

    #[test]
    fn test_profit_split() {
        let db = test_db();
        seed_settlement_month(&db);

        let summary = calculate_monthly_profit(&db, date(2026, 8, 20), 20).unwrap();
        assert_eq!(summary.total_revenue, dec("100000"));
        assert_eq!(summary.instructor_payments, dec("30000.00"));
        assert_eq!(summary.operational_expenses, dec("10000"));
        assert_eq!(summary.total_expenses, dec("40000.00"));
        assert_eq!(summary.gross_profit, dec("60000.00"));
        assert_eq!(summary.retained_earnings, dec("12000.00"));
        assert_eq!(summary.distributable_profit, dec("48000.00"));
    }

    #[test]
    fn test_pending_instructor_payments_are_excluded() {
        let db = test_db();
        seed_instructor(&db, "Sara Idrissi", "150", "0", "200");
        // Calculated but never approved
        calculate_instructor_payments(&db, date(2026, 8, 1)).unwrap();

        let summary = calculate_monthly_profit(&db, date(2026, 8, 1), 20).unwrap();
        assert_eq!(summary.instructor_payments, Decimal::ZERO);
    }

    #[test]
    fn test_settlement_upserts_single_row() {
        let db = test_db();
        seed_settlement_month(&db);

        let first = calculate_monthly_profit(&db, date(2026, 8, 1), 20).unwrap();
        let second = calculate_monthly_profit(&db, date(2026, 8, 1), 20).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.gross_profit, second.gross_profit);
    }

    #[test]
    fn test_distribution_uses_raw_share_percentage() {
        let db = test_db();
        seed_settlement_month(&db);
        db.add_member("Nadia Berrada", dec("15"), "private").unwrap();
        db.add_member("Hassan Fassi", dec("25"), "self_employed")
            .unwrap();

        let summary = calculate_monthly_profit(&db, date(2026, 8, 1), 20).unwrap();
        let distributions = db.list_member_distributions(summary.id).unwrap();
        assert_eq!(distributions.len(), 2);

        // 48000 x 25 / 100 and 48000 x 15 / 100, independent of the
        // shares' sum
        assert_eq!(distributions[0].member_name.as_deref(), Some("Hassan Fassi"));
        assert_eq!(distributions[0].amount, dec("12000.00"));
        assert_eq!(distributions[1].member_name.as_deref(), Some("Nadia Berrada"));
        assert_eq!(distributions[1].amount, dec("7200.00"));
        assert!(distributions.iter().all(|d| d.status == "pending"));
    }

    #[test]
    fn test_public_employee_distribution_is_cancelled() {
        let db = test_db();
        seed_settlement_month(&db);
        db.add_member("Youssef Lamrani", dec("15"), "public").unwrap();

        let summary = calculate_monthly_profit(&db, date(2026, 8, 1), 20).unwrap();
        let distributions = db.list_member_distributions(summary.id).unwrap();
        assert_eq!(distributions.len(), 1);

        // Amount is computed and stored even though the payout is barred
        let d = &distributions[0];
        assert_eq!(d.amount, dec("7200.00"));
        assert_eq!(d.status, "cancelled");
        assert!(d.is_public_employee);
    }

    #[test]
    fn test_suspended_members_are_excluded() {
        let db = test_db();
        seed_settlement_month(&db);
        db.add_member("Nadia Berrada", dec("50"), "private").unwrap();
        let suspended = db.add_member("Hassan Fassi", dec("50"), "private").unwrap();
        db.set_member_status(suspended, "suspended").unwrap();

        let summary = calculate_monthly_profit(&db, date(2026, 8, 1), 20).unwrap();
        let distributions = db.list_member_distributions(summary.id).unwrap();
        assert_eq!(distributions.len(), 1);
        assert_eq!(distributions[0].member_name.as_deref(), Some("Nadia Berrada"));
    }

    #[test]
    fn test_non_positive_profit_skips_distribution() {
        let db = test_db();
        // Expenses only, no revenue
        seed_instructor(&db, "Sara Idrissi", "150", "0", "200");
        let payments = calculate_instructor_payments(&db, date(2026, 8, 1)).unwrap();
        db.set_instructor_payment_status(payments[0].id, "approved")
            .unwrap();
        db.add_member("Nadia Berrada", dec("100"), "private").unwrap();

        let summary = calculate_monthly_profit(&db, date(2026, 8, 1), 20).unwrap();
        assert_eq!(summary.gross_profit, dec("-30000.00"));
        assert!(summary.distributable_profit < Decimal::ZERO);
        assert!(db.list_member_distributions(summary.id).unwrap().is_empty());
    }

    #[test]
    fn test_resettlement_to_loss_leaves_prior_distributions() {
        let db = test_db();
        seed_settlement_month(&db);
        db.add_member("Nadia Berrada", dec("100"), "private").unwrap();

        let summary = calculate_monthly_profit(&db, date(2026, 8, 1), 20).unwrap();
        let before = db.list_member_distributions(summary.id).unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].amount, dec("48000.00"));

        // A late expense pushes the month into a loss
        let audit = db
            .add_expense("other", "Audit", dec("200000"), date(2026, 8, 30), date(2026, 8, 1))
            .unwrap();
        db.set_expense_status(audit, "paid").unwrap();

        let resettled = calculate_monthly_profit(&db, date(2026, 8, 1), 20).unwrap();
        assert!(resettled.distributable_profit < Decimal::ZERO);

        // The allocator is skipped; the earlier rows keep their old figures
        let after = db.list_member_distributions(resettled.id).unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].amount, dec("48000.00"));
        assert_eq!(after[0].status, "pending");
    }

    #[test]
    fn test_zero_total_shares_aborts_allocation() {
        let db = test_db();
        seed_settlement_month(&db);
        db.add_member("Nadia Berrada", dec("0"), "private").unwrap();

        let summary = calculate_monthly_profit(&db, date(2026, 8, 1), 20).unwrap();
        assert!(summary.distributable_profit > Decimal::ZERO);
        assert!(db.list_member_distributions(summary.id).unwrap().is_empty());
    }

    #[test]
    fn test_finalized_summary_rejects_recalculation() {
        let db = test_db();
        seed_settlement_month(&db);
        calculate_monthly_profit(&db, date(2026, 8, 1), 20).unwrap();
        db.finalize_month(date(2026, 8, 1), date(2026, 9, 5)).unwrap();

        let err = calculate_monthly_profit(&db, date(2026, 8, 1), 20);
        assert!(err.is_err());
        assert!(err.unwrap_err().to_string().contains("finalized"));
    }

    #[test]
    fn test_financial_summary_view() {
        let db = test_db();
        seed_settlement_month(&db);
        calculate_monthly_profit(&db, date(2026, 8, 1), 20).unwrap();

        let view = get_financial_summary(&db, date(2026, 8, 27))
            .unwrap()
            .unwrap();
        assert_eq!(view.period, "August 2026");
        assert_eq!(view.gross_profit, dec("60000.00"));
        assert_eq!(view.profit_margin, dec("60.00"));
        assert!(!view.is_finalized);

        assert!(get_financial_summary(&db, date(2026, 9, 1)).unwrap().is_none());
    }

    #[test]
    fn test_dashboard_kpis() {
        let db = test_db();
        seed_settlement_month(&db);
        calculate_monthly_profit(&db, date(2026, 8, 1), 20).unwrap();

        let student = db.add_student("Karim Bennis").unwrap();
        let course = db.list_courses(None).unwrap()[0].id;
        db.enroll_student(student, course).unwrap();
        db.add_payment(student, dec("800"), date(2026, 8, 5)).unwrap();

        let kpis = dashboard_kpis(&db, date(2026, 8, 27)).unwrap();
        assert_eq!(kpis.total_students, 2);
        assert_eq!(kpis.total_courses, 1);
        assert_eq!(kpis.total_enrollments, 1);
        assert_eq!(kpis.pending_payments_count, 1);
        assert_eq!(kpis.pending_payments_amount, dec("800"));
        assert_eq!(kpis.current_month_revenue, dec("100000"));
        assert_eq!(kpis.current_month_profit, dec("60000.00"));
    }
}
