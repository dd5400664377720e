use std::collections::BTreeMap;

use formtree::{FormArray, FormDict, FormField, FormGroup, FormNode};

#[derive(formtree::GroupModel)]
struct Address {
    street: FormField<String>,
}

#[derive(formtree::GroupModel)]
struct Customer {
    address: FormGroup<Address>,
    tags: FormArray<FormField<String>>,
    scores: FormDict<FormField<i64>>,
}

fn main() {
    let tree = FormGroup::new(Customer {
        address: FormGroup::new(Address {
            street: FormField::new(Some("downing st".to_string())).unwrap(),
        })
        .unwrap(),
        tags: FormArray::new(Vec::new()).unwrap(),
        scores: FormDict::new(Vec::<(String, FormField<i64>)>::new()).unwrap(),
    })
    .unwrap();

    let value: CustomerValue = tree.value().unwrap();
    let address: AddressValue = value.address;
    assert_eq!(address.street.as_deref(), Some("downing st"));
    let tags: Vec<Option<String>> = value.tags;
    assert!(tags.is_empty());
    let scores: BTreeMap<String, Option<i64>> = value.scores;
    assert!(scores.is_empty());
}
