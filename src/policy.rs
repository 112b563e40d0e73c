//! Policy record, its status machine states, and the creation request builder
use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Serialize, Deserialize)]
pub struct TimeStamp(DateTime<Utc>);

impl TimeStamp {
    /// Wall-clock time. Only a host may call this; the engine reads time from
    /// its transaction context.
    pub fn now() -> Self {
        Self(Utc::now())
    }
    pub fn from_unix(secs: i64) -> Option<Self> {
        DateTime::from_timestamp(secs, 0).map(Self)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    pub fn checked_add(&self, delta: TimeDelta) -> Option<Self> {
        self.0.checked_add_signed(delta).map(Self)
    }
    /// Time elapsed from `earlier` to `self`; negative if `earlier` is later.
    pub fn since(&self, earlier: &TimeStamp) -> TimeDelta {
        self.0 - earlier.0
    }
}

impl From<DateTime<Utc>> for TimeStamp {
    fn from(value: DateTime<Utc>) -> Self {
        TimeStamp(value)
    }
}

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

// Encoded as [seconds, subsecond nanos] so every representable instant fits.
impl<C> minicbor::Encode<C> for TimeStamp {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.array(2)?
            .i64(self.0.timestamp())?
            .u32(self.0.timestamp_subsec_nanos())?
            .ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        if d.array()? != Some(2) {
            return Err(minicbor::decode::Error::message(
                "timestamp must be a [seconds, nanos] pair",
            ));
        }
        let secs = d.i64()?;
        let nsecs = d.u32()?;

        DateTime::from_timestamp(secs, nsecs)
            .map(TimeStamp)
            .ok_or(minicbor::decode::Error::message(
                "failed to convert timestamp to utc",
            ))
    }
}

// Decimals are stored in their fixed 16 byte binary form.
mod decimal_cbor {
    use minicbor::{Decoder, Encoder};
    use rust_decimal::Decimal;

    pub fn encode<Ctx, W: minicbor::encode::Write>(
        v: &Decimal,
        e: &mut Encoder<W>,
        _: &mut Ctx,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.bytes(&v.serialize())?.ok()
    }

    pub fn decode<Ctx>(
        d: &mut Decoder<'_>,
        _: &mut Ctx,
    ) -> Result<Decimal, minicbor::decode::Error> {
        let raw: [u8; 16] = d
            .bytes()?
            .try_into()
            .map_err(|_| minicbor::decode::Error::message("decimal must be exactly 16 bytes"))?;

        Ok(Decimal::deserialize(raw))
    }
}

#[derive(
    minicbor::Encode, minicbor::Decode, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum PolicyStatus {
    #[n(0)]
    Active,
    #[n(1)]
    Cancelled,
    #[n(2)]
    Claimed,
    #[n(3)]
    Expired,
}

impl fmt::Display for PolicyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PolicyStatus::Active => "Active",
            PolicyStatus::Cancelled => "Cancelled",
            PolicyStatus::Claimed => "Claimed",
            PolicyStatus::Expired => "Expired",
        };
        f.write_str(s)
    }
}

#[derive(
    minicbor::Encode,
    minicbor::Decode,
    Serialize,
    Deserialize,
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
)]
pub enum PolicyType {
    #[n(0)]
    #[default]
    Health,
    #[n(1)]
    Life,
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyType::Health => f.write_str("Health"),
            PolicyType::Life => f.write_str("Life"),
        }
    }
}

impl FromStr for PolicyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "health" => Ok(PolicyType::Health),
            "life" => Ok(PolicyType::Life),
            other => Err(format!("unknown policy type '{other}', expected Health or Life")),
        }
    }
}

/// A single insurance contract and its payment and settlement history.
#[derive(minicbor::Encode, minicbor::Decode, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Policy {
    #[n(0)]
    pub id: u64,
    #[n(1)]
    pub holder_name: String,
    #[n(2)]
    pub age: u32,
    #[n(3)]
    pub location: String,
    #[n(4)]
    pub company_name: String,
    #[n(5)]
    pub policy_type: PolicyType,
    #[n(6)]
    pub package_name: Option<String>,
    #[n(7)]
    #[cbor(with = "decimal_cbor")]
    pub premium: Decimal,
    #[n(8)]
    #[cbor(with = "decimal_cbor")]
    pub coverage: Decimal,
    #[n(9)]
    pub effective_date: TimeStamp,
    #[n(10)]
    pub expiration_date: TimeStamp,
    #[n(11)]
    #[cbor(with = "decimal_cbor")]
    pub total_paid: Decimal,
    #[n(12)]
    pub payment_count: u32,
    #[n(13)]
    pub last_payment_time: Option<TimeStamp>,
    #[n(14)]
    #[cbor(with = "decimal_cbor")]
    pub user_balance: Decimal,
    #[n(15)]
    pub status: PolicyStatus,
    #[n(16)]
    pub installment_no: u32,
    #[n(17)]
    #[cbor(with = "decimal_cbor")]
    pub total_premium_to_pay: Decimal,
}

impl Policy {
    pub fn is_fully_paid(&self) -> bool {
        self.total_paid >= self.total_premium_to_pay
    }
}

/// Creation request. A named package, when set, overrides premium,
/// installment count and coverage; the profit rate is ignored in that case.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyRequest {
    pub holder_name: String,
    pub age: u32,
    pub location: String,
    pub company_name: String,
    pub policy_type: PolicyType,
    pub package_name: Option<String>,
    pub premium: Decimal,
    pub installment_no: u32,
    // zero or negative selects the ledger's default rate
    pub profit_rate: Decimal,
}

impl PolicyRequest {
    pub fn new(policy_type: PolicyType) -> Self {
        Self {
            policy_type,
            ..Self::default()
        }
    }
    pub fn set_holder_name(mut self, name: &str) -> Self {
        self.holder_name = name.to_string();
        self
    }
    pub fn set_age(mut self, age: u32) -> Self {
        self.age = age;
        self
    }
    pub fn set_location(mut self, location: &str) -> Self {
        self.location = location.to_string();
        self
    }
    pub fn set_company_name(mut self, company: &str) -> Self {
        self.company_name = company.to_string();
        self
    }
    /// An empty name clears the package.
    pub fn set_package(mut self, name: &str) -> Self {
        self.package_name = (!name.is_empty()).then(|| name.to_string());
        self
    }
    pub fn set_premium(mut self, premium: Decimal) -> Self {
        self.premium = premium;
        self
    }
    pub fn set_installment_no(mut self, installment_no: u32) -> Self {
        self.installment_no = installment_no;
        self
    }
    pub fn set_profit_rate(mut self, rate: Decimal) -> Self {
        self.profit_rate = rate;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> Policy {
        let start = TimeStamp::from_unix(1_700_000_000).unwrap();
        Policy {
            id: 7,
            holder_name: "Ada".into(),
            age: 41,
            location: "Dhaka".into(),
            company_name: "Acme Mutual".into(),
            policy_type: PolicyType::Life,
            package_name: Some("Gold".into()),
            premium: dec!(10000),
            coverage: dec!(800000),
            effective_date: start,
            expiration_date: start.checked_add(TimeDelta::minutes(5)).unwrap(),
            total_paid: dec!(20000.50),
            payment_count: 2,
            last_payment_time: Some(start),
            user_balance: Decimal::ZERO,
            status: PolicyStatus::Active,
            installment_no: 20,
            total_premium_to_pay: dec!(200000),
        }
    }

    #[test]
    fn policy_cbor_keeps_decimal_scale() {
        let policy = sample();

        let encoded = minicbor::to_vec(&policy).unwrap();
        let decoded: Policy = minicbor::decode(&encoded).unwrap();

        assert_eq!(policy, decoded);
        assert_eq!(decoded.total_paid.scale(), 2);
    }

    #[test]
    fn truncated_record_fails_to_decode() {
        let encoded = minicbor::to_vec(sample()).unwrap();

        assert!(minicbor::decode::<Policy>(&encoded[..encoded.len() / 2]).is_err());
    }

    #[test]
    fn policy_type_parses_either_case() {
        assert_eq!("life".parse::<PolicyType>().unwrap(), PolicyType::Life);
        assert_eq!("Health".parse::<PolicyType>().unwrap(), PolicyType::Health);
        assert!("Auto".parse::<PolicyType>().is_err());
    }

    #[test]
    fn empty_package_name_clears_package() {
        let req = PolicyRequest::new(PolicyType::Health)
            .set_package("Gold")
            .set_package("");

        assert_eq!(req.package_name, None);
    }

    #[test]
    fn timestamps_beyond_nanosecond_range_encode() {
        // year 2286 and year 1600 both fall outside i64 nanoseconds
        for secs in [10_000_000_000i64, -11_676_096_000] {
            let ts = TimeStamp::from_unix(secs).unwrap();

            let encoded = minicbor::to_vec(ts).unwrap();
            let decoded: TimeStamp = minicbor::decode(&encoded).unwrap();

            assert_eq!(ts, decoded);
        }
    }

    #[test]
    fn since_is_signed() {
        let a = TimeStamp::from_unix(100).unwrap();
        let b = TimeStamp::from_unix(110).unwrap();

        assert_eq!(b.since(&a), TimeDelta::seconds(10));
        assert_eq!(a.since(&b), TimeDelta::seconds(-10));
    }
}
