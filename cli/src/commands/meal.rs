use anyhow::{Context, Result};
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use ada_core::db::Database;
use ada_core::models::{
    ExtendedNutrition, FoodSource, Meal, MealCategory, NewFoodItem, NewMeal, validate_meal_name,
};
use ada_core::sync::Syncer;

use super::helpers::{
    json_error, local_day_bounds, local_time, no_neg_zero, parse_date, timestamp_on, truncate,
};

/// Nutrition for a meal entered by hand. Logged as a single food item.
pub(crate) struct MealInput {
    pub name: String,
    pub meal_type: String,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub grams: f64,
    pub notes: Option<String>,
    pub date: Option<String>,
}

impl MealInput {
    fn into_new_meal(self) -> Result<NewMeal> {
        let name = validate_meal_name(&self.name)?;
        let category = MealCategory::parse(&self.meal_type).with_context(|| {
            format!(
                "Invalid meal type '{}'. Use breakfast, lunch, dinner, snack or other",
                self.meal_type
            )
        })?;
        let timestamp = timestamp_on(parse_date(self.date)?)?;
        Ok(NewMeal {
            remote_id: None,
            name: name.clone(),
            category,
            timestamp,
            notes: self.notes,
            items: vec![NewFoodItem {
                remote_id: None,
                name,
                source: FoodSource::Manual,
                grams: self.grams,
                calories: self.calories.max(0.0),
                protein_g: self.protein.max(0.0),
                carbs_g: self.carbs.max(0.0),
                fat_g: self.fat.max(0.0),
                extra: ExtendedNutrition::default(),
                barcode: None,
            }],
            reported_totals: None,
            is_synced: false,
        })
    }
}

pub(crate) fn cmd_meals(db: &Database, user_id: &str, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date)?;
    let (start, end) = local_day_bounds(date)?;
    let meals = db.list_meals_between(user_id, start, end)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&meals)?);
        return Ok(());
    }

    if meals.is_empty() {
        eprintln!("No meals for {date}. Use `ada meal add` or `ada chat` to log one.");
        return Ok(());
    }

    print_meal_table(&meals);

    let calories: f64 = meals.iter().map(|m| m.totals.calories).sum();
    let protein: f64 = meals.iter().map(|m| m.totals.protein_g).sum();
    let carbs: f64 = meals.iter().map(|m| m.totals.carbs_g).sum();
    let fat: f64 = meals.iter().map(|m| m.totals.fat_g).sum();
    println!("  TOTAL: {calories:.0} kcal | P:{protein:.0}g C:{carbs:.0}g F:{fat:.0}g");

    if let Some(target) = db.get_macro_targets(user_id)? {
        #[allow(clippy::cast_precision_loss)]
        let remaining = target.calories as f64 - calories;
        let remaining = no_neg_zero(remaining);
        println!("  REMAINING: {remaining:.0} kcal of {}", target.calories);
    }

    Ok(())
}

fn print_meal_table(meals: &[Meal]) {
    #[derive(Tabled)]
    struct MealRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Time")]
        time: String,
        #[tabled(rename = "Type")]
        category: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "kcal")]
        calories: String,
        #[tabled(rename = "P (g)")]
        protein: String,
        #[tabled(rename = "C (g)")]
        carbs: String,
        #[tabled(rename = "F (g)")]
        fat: String,
        #[tabled(rename = "Synced")]
        synced: &'static str,
    }

    let rows: Vec<MealRow> = meals
        .iter()
        .map(|m| MealRow {
            id: m.id,
            time: local_time(m.timestamp),
            category: m.category.to_string(),
            name: truncate(&m.name, 30),
            calories: format!("{:.0}", m.totals.calories),
            protein: format!("{:.1}", m.totals.protein_g),
            carbs: format!("{:.1}", m.totals.carbs_g),
            fat: format!("{:.1}", m.totals.fat_g),
            synced: if m.is_synced { "yes" } else { "no" },
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(4..8)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn cmd_meal_show(db: &Database, id: i64, json: bool) -> Result<()> {
    let Ok(meal) = db.get_meal(id) else {
        if json {
            println!("{}", json_error(&format!("Meal {id} not found")));
        } else {
            eprintln!("Meal {id} not found");
        }
        process::exit(2);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&meal)?);
        return Ok(());
    }

    let category = meal.category.as_str().to_uppercase();
    println!("{category}: {} ({})", meal.name, local_time(meal.timestamp));
    if let Some(remote_id) = &meal.remote_id {
        println!("  Remote ID: {remote_id}");
    }
    if let Some(notes) = &meal.notes {
        println!("  Notes: {notes}");
    }
    for item in &meal.items {
        println!(
            "    {} — {:.0}g — {:.0} kcal | P:{:.0}g C:{:.0}g F:{:.0}g [{}]",
            item.name, item.grams, item.calories, item.protein_g, item.carbs_g, item.fat_g, item.source
        );
    }
    let t = &meal.totals;
    println!(
        "  TOTAL: {:.0} kcal | P:{:.0}g C:{:.0}g F:{:.0}g",
        t.calories, t.protein_g, t.carbs_g, t.fat_g
    );
    if let Some(fiber) = t.fiber_g {
        println!("  Fiber: {fiber:.1}g");
    }
    Ok(())
}

pub(crate) fn cmd_meal_add(db: &Database, user_id: &str, input: MealInput, json: bool) -> Result<()> {
    let meal = db.insert_meal(user_id, &input.into_new_meal()?)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&meal)?);
    } else {
        println!(
            "Logged {} for {} — {:.0} kcal (id {}, not yet synced)",
            meal.name, meal.category, meal.totals.calories, meal.id
        );
    }
    Ok(())
}

pub(crate) async fn cmd_meal_delete(syncer: &Syncer, id: i64, json: bool) -> Result<()> {
    if syncer.delete_meal(id).await? {
        if json {
            println!("{}", serde_json::json!({ "deleted": id }));
        } else {
            println!("Deleted meal {id}");
        }
        Ok(())
    } else {
        if json {
            println!("{}", json_error(&format!("Meal {id} not found")));
        } else {
            eprintln!("Meal {id} not found");
        }
        process::exit(2);
    }
}
