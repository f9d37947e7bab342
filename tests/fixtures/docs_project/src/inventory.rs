pub struct Item {
    pub name: String,
    pub quantity: u32,
}

pub fn total(items: &[Item]) -> u32 {
    items.iter().map(|item| item.quantity).sum()
}
