use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Duration,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  Utc
};

const WIRE_FORMAT: &str =
  "%Y-%m-%dT%H:%M:%S";

const NAIVE_FORMATS: &[&str] = &[
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%dT%H:%M:%S",
  "%Y-%m-%dT%H:%M",
  "%Y-%m-%d %H:%M:%S%.f",
  "%Y-%m-%d %H:%M:%S"
];

/// Parses a timestamp as the API sends it.
///
/// Naive values are taken as UTC; a bare date is midnight UTC.
#[must_use]
pub fn parse_wire_datetime(
  raw: &str
) -> Option<DateTime<Utc>> {
  let token = raw.trim();
  if token.is_empty() {
    return None;
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Some(dt.with_timezone(&Utc));
  }

  for fmt in NAIVE_FORMATS {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return Some(ndt.and_utc());
    }
  }

  NaiveDate::parse_from_str(
    token, "%Y-%m-%d"
  )
  .ok()
  .map(|date| {
    date.and_time(NaiveTime::MIN).and_utc()
  })
}

#[must_use]
pub fn format_wire_datetime(
  dt: DateTime<Utc>
) -> String {
  dt.format(WIRE_FORMAT).to_string()
}

/// Short display form: the date, plus the clock time when it is not
/// midnight.
#[must_use]
pub fn format_due(
  dt: DateTime<Utc>
) -> String {
  if dt.time() == NaiveTime::MIN {
    dt.format("%Y-%m-%d").to_string()
  } else {
    dt.format("%Y-%m-%d %H:%M")
      .to_string()
  }
}

#[must_use]
pub fn start_of_day(
  dt: DateTime<Utc>
) -> DateTime<Utc> {
  dt.date_naive()
    .and_time(NaiveTime::MIN)
    .and_utc()
}

/// Parses a due date typed on the command line.
///
/// Accepts `now`, `today`, `tomorrow`, `yesterday`, `+Nd` and every
/// form [`parse_wire_datetime`] understands.
#[tracing::instrument(skip(now), fields(input = input))]
pub fn parse_due_expr(
  input: &str,
  now: DateTime<Utc>
) -> anyhow::Result<DateTime<Utc>> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "now" => return Ok(now),
    | "today" => {
      return Ok(start_of_day(now));
    }
    | "tomorrow" => {
      return Ok(
        start_of_day(now)
          + Duration::days(1)
      );
    }
    | "yesterday" => {
      return Ok(
        start_of_day(now)
          - Duration::days(1)
      );
    }
    | _ => {}
  }

  if let Some(days) = lower
    .strip_prefix('+')
    .and_then(|rest| {
      rest.strip_suffix('d')
    })
  {
    let days: i64 =
      days.parse().with_context(|| {
        format!(
          "invalid day offset: \
           {token}"
        )
      })?;
    return Duration::try_days(days)
      .and_then(|offset| {
        start_of_day(now)
          .checked_add_signed(offset)
      })
      .ok_or_else(|| {
        anyhow!(
          "invalid day offset: {token}"
        )
      });
  }

  parse_wire_datetime(token)
    .ok_or_else(|| {
      anyhow!(
        "unrecognized date: {token} \
         (use YYYY-MM-DD, an ISO \
         datetime, today, tomorrow \
         or +Nd)"
      )
    })
}

pub mod wire_date_serde {
  use chrono::{
    DateTime,
    Utc
  };
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    dt: &DateTime<Utc>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &super::format_wire_datetime(*dt)
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<DateTime<Utc>, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    super::parse_wire_datetime(&raw)
      .ok_or_else(|| {
        serde::de::Error::custom(
          format!(
            "invalid datetime: {raw}"
          )
        )
      })
  }

  pub mod option {
    use chrono::{
      DateTime,
      Utc
    };
    use serde::{
      Deserialize,
      Deserializer,
      Serializer
    };

    pub fn serialize<S>(
      dt: &Option<DateTime<Utc>>,
      serializer: S
    ) -> Result<S::Ok, S::Error>
    where
      S: Serializer
    {
      match dt {
        | Some(value) => {
          super::serialize(
            value, serializer
          )
        }
        | None => {
          serializer.serialize_none()
        }
      }
    }

    pub fn deserialize<'de, D>(
      deserializer: D
    ) -> Result<
      Option<DateTime<Utc>>,
      D::Error
    >
    where
      D: Deserializer<'de>
    {
      let opt =
        Option::<String>::deserialize(
          deserializer
        )?;
      match opt {
        | Some(raw)
          if raw.trim().is_empty() =>
        {
          Ok(None)
        }
        | Some(raw) => {
          super::super::parse_wire_datetime(&raw)
            .map(Some)
            .ok_or_else(|| {
              serde::de::Error::custom(
                format!(
                  "invalid datetime: \
                   {raw}"
                )
              )
            })
        }
        | None => Ok(None)
      }
    }
  }
}
