use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instructor {
    pub id: i64,
    pub full_name: String,
    pub status: String, // "active", "inactive", "on_leave"
    pub hourly_rate: Decimal,
    pub tax_rate_percentage: Decimal,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String, // "pending", "active", "completed", "cancelled"
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseAssignment {
    pub id: i64,
    pub course_id: i64,
    pub course_name: Option<String>, // denormalized for convenience
    pub instructor_id: i64,
    pub instructor_name: Option<String>,
    pub hours_taught: Decimal,
    pub is_primary: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub full_name: String,
    pub status: String, // "active", "inactive", "graduated"
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentPayment {
    pub id: i64,
    pub student_id: i64,
    pub student_name: Option<String>,
    pub amount: Decimal,
    pub amount_paid: Decimal,
    pub due_date: NaiveDate,
    pub payment_date: Option<NaiveDate>,
    pub status: String, // "pending", "partially_paid", "paid", "cancelled", "refunded"
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    pub category: String, // "rent", "utilities", "supplies", "marketing", "maintenance", "insurance", "salaries", "taxes", "other"
    pub description: String,
    pub amount: Decimal,
    pub expense_date: NaiveDate,
    pub period_month: NaiveDate,
    pub status: String, // "pending", "approved", "paid", "rejected"
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: i64,
    pub full_name: String,
    pub share_percentage: Decimal,
    pub employment_status: String, // "public", "private", "self_employed", "unemployed"
    pub status: String,            // "active", "inactive", "suspended"
    pub created_at: String,
}

impl Member {
    /// Public-sector employees are barred by law from receiving
    /// cooperative profit distributions.
    pub fn can_receive_profit(&self) -> bool {
        self.employment_status != "public" && self.status == "active"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructorPayment {
    pub id: i64,
    pub instructor_id: i64,
    pub instructor_name: Option<String>,
    pub period_month: NaiveDate,
    pub total_hours: Decimal,
    pub hourly_rate: Decimal, // snapshot taken at calculation time
    pub gross_amount: Decimal,
    pub tax_amount: Decimal,
    pub net_amount: Decimal,
    pub status: String, // "pending", "approved", "paid", "cancelled"
    pub payment_date: Option<NaiveDate>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyFinancial {
    pub id: i64,
    pub period_month: NaiveDate,
    pub total_revenue: Decimal,
    pub instructor_payments: Decimal,
    pub operational_expenses: Decimal,
    pub other_expenses: Decimal,
    pub total_expenses: Decimal,
    pub gross_profit: Decimal,
    pub retained_earnings: Decimal,
    pub distributable_profit: Decimal,
    pub is_finalized: bool,
    pub finalized_date: Option<NaiveDate>,
    pub created_at: String,
    pub updated_at: String,
}

impl MonthlyFinancial {
    pub fn profit_margin(&self) -> Decimal {
        if self.total_revenue > Decimal::ZERO {
            (self.gross_profit / self.total_revenue * Decimal::ONE_HUNDRED).round_dp(2)
        } else {
            Decimal::ZERO
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberDistribution {
    pub id: i64,
    pub member_id: i64,
    pub member_name: Option<String>,
    pub monthly_financial_id: i64,
    pub share_percentage: Decimal, // snapshot taken at allocation time
    pub amount: Decimal,
    pub status: String, // "pending", "approved", "paid", "cancelled"
    pub is_public_employee: bool,
    pub payment_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetAllocation {
    pub id: i64,
    pub period_month: NaiveDate,
    pub category: String,
    pub allocated_amount: Decimal,
}

/// One line of the monthly budget report: allocation vs. paid expenses.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetLine {
    pub category: String,
    pub allocated_amount: Decimal,
    pub spent_amount: Decimal,
    pub remaining_budget: Decimal,
    pub utilization_percentage: Decimal,
}

/// Read-only projection of one month's settlement, for display or JSON.
#[derive(Debug, Clone, Serialize)]
pub struct FinancialSummaryView {
    pub period: String, // e.g. "August 2026"
    pub total_revenue: Decimal,
    pub total_expenses: Decimal,
    pub gross_profit: Decimal,
    pub retained_earnings: Decimal,
    pub distributable_profit: Decimal,
    pub profit_margin: Decimal,
    pub is_finalized: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardKpis {
    pub total_students: i64,
    pub total_courses: i64,
    pub total_enrollments: i64,
    pub pending_payments_count: i64,
    pub pending_payments_amount: Decimal,
    pub current_month_revenue: Decimal,
    pub current_month_profit: Decimal,
}
