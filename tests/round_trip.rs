//! Property tests: entity -> generic map -> entity reproduces every stored value

use caseschema::{
    AttributeType, Entity, EntityMapper, ScalarKind, Schema, SchemaRegistry, Value,
};
use chrono::{NaiveDate, NaiveTime};
use proptest::prelude::*;
use rust_decimal::Decimal;

fn registry() -> SchemaRegistry {
    let string = || AttributeType::Scalar(ScalarKind::String);
    let mut registry = SchemaRegistry::new();

    registry
        .register(
            Schema::builder("address")
                .attribute("street", string())
                .attribute("city", string())
                .build()
                .unwrap(),
        )
        .unwrap();
    registry
        .register(
            Schema::builder("email")
                .attribute("email", string())
                .attribute("primary", AttributeType::Scalar(ScalarKind::Boolean))
                .build()
                .unwrap(),
        )
        .unwrap();
    registry
        .register(
            Schema::builder("contact")
                .attribute("firstName", string())
                .attribute("lastName", string())
                .attribute("children", AttributeType::Scalar(ScalarKind::Integer))
                .attribute("income", AttributeType::Scalar(ScalarKind::Decimal))
                .attribute("consentGiven", AttributeType::Scalar(ScalarKind::Boolean))
                .attribute("birthDate", AttributeType::Scalar(ScalarKind::Date))
                .attribute("callTime", AttributeType::Scalar(ScalarKind::Time))
                .attribute("tags", AttributeType::List(ScalarKind::String))
                .attribute("scores", AttributeType::List(ScalarKind::Decimal))
                .attribute("address", AttributeType::Entity("address".to_string()))
                .attribute("emails", AttributeType::EntityList("email".to_string()))
                .computed_attribute("fullName", string(), "concat(' ', firstName, lastName)")
                .build()
                .unwrap(),
        )
        .unwrap();

    registry
}

#[derive(Debug, Clone)]
struct ContactData {
    first_name: Option<String>,
    last_name: Option<String>,
    children: Option<i64>,
    income: Option<Decimal>,
    consent_given: Option<bool>,
    birth_date: Option<NaiveDate>,
    call_time: Option<NaiveTime>,
    tags: Vec<String>,
    scores: Vec<Decimal>,
    address: Option<(Option<String>, Option<String>)>,
    emails: Vec<(String, Option<bool>)>,
}

fn arb_text() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ,.'-]{0,12}"
}

fn arb_decimal() -> impl Strategy<Value = Decimal> {
    (any::<i64>(), 0u32..=12).prop_map(|(mantissa, scale)| Decimal::new(mantissa, scale))
}

fn arb_date() -> impl Strategy<Value = NaiveDate> {
    (1i32..3_600_000).prop_map(|days| {
        NaiveDate::from_num_days_from_ce_opt(days).unwrap()
    })
}

fn arb_time() -> impl Strategy<Value = NaiveTime> {
    (0u32..86_400, 0u32..1000).prop_map(|(seconds, millis)| {
        NaiveTime::from_num_seconds_from_midnight_opt(seconds, millis * 1_000_000).unwrap()
    })
}

fn arb_contact() -> impl Strategy<Value = ContactData> {
    (
        (
            proptest::option::of(arb_text()),
            proptest::option::of(arb_text()),
            proptest::option::of(any::<i64>()),
            proptest::option::of(arb_decimal()),
            proptest::option::of(any::<bool>()),
            proptest::option::of(arb_date()),
            proptest::option::of(arb_time()),
        ),
        (
            prop::collection::vec(arb_text(), 0..4),
            prop::collection::vec(arb_decimal(), 0..4),
            proptest::option::of((
                proptest::option::of(arb_text()),
                proptest::option::of(arb_text()),
            )),
            prop::collection::vec((arb_text(), proptest::option::of(any::<bool>())), 0..3),
        ),
    )
        .prop_map(
            |(
                (first_name, last_name, children, income, consent_given, birth_date, call_time),
                (tags, scores, address, emails),
            )| ContactData {
                first_name,
                last_name,
                children,
                income,
                consent_given,
                birth_date,
                call_time,
                tags,
                scores,
                address,
                emails,
            },
        )
}

fn set_if_some(entity: &mut Entity, name: &str, value: Option<impl Into<Value>>) {
    if let Some(value) = value {
        entity.set(name, value).unwrap();
    }
}

fn build(registry: &SchemaRegistry, data: ContactData) -> Entity {
    let mut contact = Entity::new(registry.get("contact").unwrap());

    set_if_some(&mut contact, "firstName", data.first_name);
    set_if_some(&mut contact, "lastName", data.last_name);
    set_if_some(&mut contact, "children", data.children);
    set_if_some(&mut contact, "income", data.income);
    set_if_some(&mut contact, "consentGiven", data.consent_given);
    set_if_some(&mut contact, "birthDate", data.birth_date);
    set_if_some(&mut contact, "callTime", data.call_time);
    for tag in data.tags {
        contact.add("tags", tag).unwrap();
    }
    for score in data.scores {
        contact.add("scores", score).unwrap();
    }

    if let Some((street, city)) = data.address {
        let mut address = Entity::new(registry.get("address").unwrap());
        set_if_some(&mut address, "street", street);
        set_if_some(&mut address, "city", city);
        contact.set("address", address).unwrap();
    }

    for (email, primary) in data.emails {
        let mut entry = Entity::new(registry.get("email").unwrap());
        entry.set("email", email).unwrap();
        set_if_some(&mut entry, "primary", primary);
        contact.add("emails", entry).unwrap();
    }

    contact
}

proptest! {
    #[test]
    fn generic_map_round_trip_preserves_stored_values(data in arb_contact()) {
        let registry = registry();
        let mapper = EntityMapper::default();
        let contact = build(&registry, data);

        let map = mapper.to_generic_map(&contact);
        prop_assert!(!map.contains_key("fullName"));

        let restored = mapper
            .from_generic_map(registry.get("contact").unwrap(), &map, &registry)
            .unwrap();
        prop_assert_eq!(&restored, &contact);
        prop_assert_eq!(restored.get("fullName").unwrap(), contact.get("fullName").unwrap());
    }
}
