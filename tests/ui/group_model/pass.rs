use formtree::{ControlLens, FormField, FormGroup, FormNode, GroupModel};

#[derive(formtree::GroupModel)]
struct DemoForm {
    email: FormField<String>,
}

fn main() {
    let fields = DemoForm::fields();
    let lens = fields.email();
    let group = FormGroup::new(DemoForm {
        email: FormField::new(Some("a@demo".to_string())).unwrap(),
    })
    .unwrap();
    assert_eq!(lens.key().as_str(), "email");
    let value: DemoFormValue = group.value().unwrap();
    assert_eq!(value.email.as_deref(), Some("a@demo"));
    assert_eq!(
        lens.get(group.controls()).value().unwrap().as_deref(),
        Some("a@demo")
    );
}
