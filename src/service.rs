//! Service layer API for the policy lifecycle
//!
//! Every operation runs inside one host transaction: it reads what it needs
//! through the [`TransactionContext`], validates, applies a single transition
//! and writes the record back. An `Err` means the host must discard the
//! transaction, so a rejected operation never leaves partial state behind.
use super::config::EngineConfig;
use super::coverage::{calculate_maturity, resolve_package};
use super::error::PolicyError;
use super::ledger::TransactionContext;
use super::policy::{Policy, PolicyRequest, PolicyStatus, PolicyType};
use super::{sequence, store};
use rust_decimal::Decimal;
use std::str::FromStr;

pub const PROFIT_RATE_KEY: &str = "profitPercentageDefault";

/// Fields overwritten wholesale by [`PolicyService::update_policy`].
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyUpdate {
    pub holder_name: String,
    pub policy_type: PolicyType,
    pub premium: Decimal,
    pub coverage: Decimal,
    pub installment_no: u32,
    pub total_premium_to_pay: Decimal,
}

pub struct PolicyService {
    config: EngineConfig,
}

impl PolicyService {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start the policy counter and seed the stored default profit rate.
    /// Refused once the counter exists, so ids are never handed out twice.
    pub fn init_ledger(&self, ctx: &mut impl TransactionContext) -> Result<(), PolicyError> {
        if ctx.get_state(sequence::COUNTER_KEY)?.is_some() {
            return Err(PolicyError::AlreadyInitialized);
        }
        sequence::initialize(ctx)?;
        ctx.put_state(
            PROFIT_RATE_KEY,
            self.config.default_profit_rate.to_string().into_bytes(),
        )?;

        tracing::info!(rate = %self.config.default_profit_rate, "ledger initialised");
        Ok(())
    }

    pub fn default_profit_rate(
        &self,
        ctx: &mut impl TransactionContext,
    ) -> Result<Decimal, PolicyError> {
        let Some(raw) = ctx.get_state(PROFIT_RATE_KEY)? else {
            return Ok(self.config.default_profit_rate);
        };

        std::str::from_utf8(&raw)
            .ok()
            .and_then(|s| Decimal::from_str(s).ok())
            .ok_or_else(|| PolicyError::corrupt(PROFIT_RATE_KEY, "profit rate is not a decimal"))
    }

    /// Only affects policies created afterwards; coverage is frozen at creation.
    pub fn set_default_profit_rate(
        &self,
        ctx: &mut impl TransactionContext,
        rate: Decimal,
    ) -> Result<(), PolicyError> {
        if rate <= Decimal::ZERO {
            return Err(PolicyError::InvalidProfitRate(rate));
        }
        ctx.put_state(PROFIT_RATE_KEY, rate.to_string().into_bytes())?;

        tracing::info!(%rate, "default profit rate updated");
        Ok(())
    }

    /// Create a new active policy and return its id.
    pub fn create_policy(
        &self,
        ctx: &mut impl TransactionContext,
        request: PolicyRequest,
    ) -> Result<u64, PolicyError> {
        // an empty name means no package, same as the builder
        let package_name = request.package_name.filter(|name| !name.is_empty());
        let (premium, installment_no, coverage) = match package_name.as_deref() {
            Some(name) => {
                let package = resolve_package(name)?;
                (package.premium, package.installment_no, package.coverage)
            }
            None => {
                if request.premium <= Decimal::ZERO {
                    return Err(PolicyError::InvalidAmount(request.premium));
                }
                if request.installment_no == 0 {
                    return Err(PolicyError::InvalidInstallmentNo);
                }
                let default_rate = if request.profit_rate > Decimal::ZERO {
                    request.profit_rate
                } else {
                    self.default_profit_rate(ctx)?
                };
                let coverage = calculate_maturity(
                    request.premium,
                    request.installment_no,
                    request.profit_rate,
                    default_rate,
                )?;
                (request.premium, request.installment_no, coverage)
            }
        };
        let total_premium_to_pay = premium
            .checked_mul(Decimal::from(installment_no))
            .ok_or(PolicyError::Overflow("total premium to pay"))?;

        let id = sequence::next(ctx)?;
        if store::contains(ctx, id)? {
            return Err(PolicyError::IdInUse(id));
        }
        let effective_date = ctx.tx_timestamp();
        let expiration_date = effective_date
            .checked_add(self.config.policy_term)
            .ok_or(PolicyError::Overflow("expiration date"))?;

        let policy = Policy {
            id,
            holder_name: request.holder_name,
            age: request.age,
            location: request.location,
            company_name: request.company_name,
            policy_type: request.policy_type,
            package_name,
            premium,
            coverage,
            effective_date,
            expiration_date,
            total_paid: Decimal::ZERO,
            payment_count: 0,
            last_payment_time: None,
            user_balance: Decimal::ZERO,
            status: PolicyStatus::Active,
            installment_no,
            total_premium_to_pay,
        };
        store::write(ctx, &policy)?;

        tracing::info!(
            policy = id,
            kind = %policy.policy_type,
            %coverage,
            %total_premium_to_pay,
            "policy created"
        );
        Ok(id)
    }

    pub fn get_policy(
        &self,
        ctx: &mut impl TransactionContext,
        id: u64,
    ) -> Result<Policy, PolicyError> {
        tracing::debug!(policy = id, "reading policy");
        store::read(ctx, id)
    }

    /// Accept one installment of `amount` at the transaction time.
    pub fn pay_premium(
        &self,
        ctx: &mut impl TransactionContext,
        id: u64,
        amount: Decimal,
    ) -> Result<Policy, PolicyError> {
        let mut policy = store::read(ctx, id)?;

        if policy.status != PolicyStatus::Active {
            return Err(PolicyError::NotActive {
                id,
                status: policy.status,
            });
        }
        if policy.payment_count >= policy.installment_no {
            return Err(PolicyError::InstallmentLimitReached(policy.installment_no));
        }
        if amount <= Decimal::ZERO {
            return Err(PolicyError::InvalidAmount(amount));
        }

        let now = ctx.tx_timestamp();
        if let Some(last) = policy.last_payment_time {
            let elapsed = now.since(&last);
            if elapsed < self.config.min_payment_interval {
                return Err(PolicyError::TooSoon {
                    elapsed: elapsed.num_seconds(),
                    required: self.config.min_payment_interval.num_seconds(),
                });
            }
        }

        policy.total_paid = policy
            .total_paid
            .checked_add(amount)
            .ok_or(PolicyError::Overflow("total paid"))?;
        policy.payment_count += 1;
        policy.last_payment_time = Some(now);
        store::write(ctx, &policy)?;

        tracing::info!(
            policy = id,
            %amount,
            payment = policy.payment_count,
            of = policy.installment_no,
            "premium accepted"
        );
        Ok(policy)
    }

    /// Settle a fully paid policy: its coverage moves into the user balance.
    pub fn claim_coverage(
        &self,
        ctx: &mut impl TransactionContext,
        id: u64,
    ) -> Result<Policy, PolicyError> {
        let mut policy = store::read(ctx, id)?;

        match policy.status {
            PolicyStatus::Claimed => return Err(PolicyError::AlreadyClaimed(id)),
            PolicyStatus::Cancelled => {
                return Err(PolicyError::NotActive {
                    id,
                    status: policy.status,
                });
            }
            PolicyStatus::Active | PolicyStatus::Expired => {}
        }
        if !policy.is_fully_paid() {
            return Err(PolicyError::PremiumShortfall {
                paid: policy.total_paid,
                required: policy.total_premium_to_pay,
            });
        }

        policy.user_balance = policy
            .user_balance
            .checked_add(policy.coverage)
            .ok_or(PolicyError::Overflow("user balance"))?;
        policy.status = PolicyStatus::Claimed;
        store::write(ctx, &policy)?;

        tracing::info!(policy = id, coverage = %policy.coverage, "coverage claimed");
        Ok(policy)
    }

    /// Settle a partially paid policy: everything paid so far is returned.
    pub fn cancel_policy(
        &self,
        ctx: &mut impl TransactionContext,
        id: u64,
    ) -> Result<Policy, PolicyError> {
        let mut policy = store::read(ctx, id)?;

        match policy.status {
            PolicyStatus::Cancelled => return Err(PolicyError::AlreadyCancelled(id)),
            PolicyStatus::Claimed => {
                return Err(PolicyError::NotActive {
                    id,
                    status: policy.status,
                });
            }
            PolicyStatus::Active | PolicyStatus::Expired => {}
        }
        if policy.is_fully_paid() {
            return Err(PolicyError::PremiumAlreadyComplete {
                paid: policy.total_paid,
                required: policy.total_premium_to_pay,
            });
        }

        policy.user_balance = policy
            .user_balance
            .checked_add(policy.total_paid)
            .ok_or(PolicyError::Overflow("user balance"))?;
        policy.status = PolicyStatus::Cancelled;
        store::write(ctx, &policy)?;

        tracing::info!(policy = id, refunded = %policy.total_paid, "policy cancelled");
        Ok(policy)
    }

    /// Close an active policy whose term has ended. No funds move.
    pub fn expire_policy(
        &self,
        ctx: &mut impl TransactionContext,
        id: u64,
    ) -> Result<Policy, PolicyError> {
        let mut policy = store::read(ctx, id)?;

        if policy.status != PolicyStatus::Active {
            return Err(PolicyError::NotActive {
                id,
                status: policy.status,
            });
        }
        if ctx.tx_timestamp() < policy.expiration_date {
            return Err(PolicyError::NotExpired(id));
        }

        policy.status = PolicyStatus::Expired;
        store::write(ctx, &policy)?;

        tracing::info!(policy = id, "policy expired");
        Ok(policy)
    }

    /// Administrative overwrite. No status guard, nothing is recomputed.
    pub fn update_policy(
        &self,
        ctx: &mut impl TransactionContext,
        id: u64,
        update: PolicyUpdate,
    ) -> Result<Policy, PolicyError> {
        let mut policy = store::read(ctx, id)?;

        policy.holder_name = update.holder_name;
        policy.policy_type = update.policy_type;
        policy.premium = update.premium;
        policy.coverage = update.coverage;
        policy.installment_no = update.installment_no;
        policy.total_premium_to_pay = update.total_premium_to_pay;
        store::write(ctx, &policy)?;

        tracing::info!(policy = id, status = %policy.status, "policy overwritten");
        Ok(policy)
    }

    /// Administrative removal, bypassing the state machine. The id is not
    /// released for reuse.
    pub fn delete_policy(
        &self,
        ctx: &mut impl TransactionContext,
        id: u64,
    ) -> Result<(), PolicyError> {
        if !store::contains(ctx, id)? {
            return Err(PolicyError::NotFound(id));
        }
        store::delete(ctx, id)?;

        tracing::warn!(policy = id, "policy deleted");
        Ok(())
    }

    pub fn total_paid(
        &self,
        ctx: &mut impl TransactionContext,
        id: u64,
    ) -> Result<Decimal, PolicyError> {
        Ok(store::read(ctx, id)?.total_paid)
    }

    pub fn installment_no(
        &self,
        ctx: &mut impl TransactionContext,
        id: u64,
    ) -> Result<u32, PolicyError> {
        Ok(store::read(ctx, id)?.installment_no)
    }

    pub fn set_installment_no(
        &self,
        ctx: &mut impl TransactionContext,
        id: u64,
        installment_no: u32,
    ) -> Result<(), PolicyError> {
        if installment_no == 0 {
            return Err(PolicyError::InvalidInstallmentNo);
        }
        let mut policy = store::read(ctx, id)?;
        policy.installment_no = installment_no;
        store::write(ctx, &policy)?;

        tracing::info!(policy = id, installment_no, "installment number updated");
        Ok(())
    }

    /// Highest id ever allocated; deleted policies still count.
    pub fn policy_count(&self, ctx: &mut impl TransactionContext) -> Result<u64, PolicyError> {
        sequence::current(ctx)
    }

    /// Every stored policy in id order.
    pub fn list_policies(
        &self,
        ctx: &mut impl TransactionContext,
    ) -> Result<Vec<Policy>, PolicyError> {
        let counter = sequence::current(ctx)?;
        if counter == 0 {
            return Ok(vec![]);
        }

        store::scan(&*ctx, 0, counter.saturating_add(1))?.collect()
    }
}
