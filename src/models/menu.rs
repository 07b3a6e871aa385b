use std::collections::HashMap;

use serde::Serialize;

use super::{inserted_id, Page, PageRequest};
use crate::store::{Executor, Row, Store, StoreError};
use crate::validate::{NameForm, OrderItem};

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Menu {
    pub id: i64,
    pub name: String,
    pub order: i64,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SubMenu {
    pub id: i64,
    pub parent_id: i64,
    pub name: String,
    pub order: i64,
}

/// A menu with its sub-menus, as the navigation page renders it.
#[derive(Debug, Serialize, Clone)]
pub struct MenuTree {
    #[serde(flatten)]
    pub menu: Menu,
    #[serde(rename = "subMenus")]
    pub sub_menus: Vec<SubMenu>,
}

impl Menu {
    fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Menu {
            id: row.i64("id")?,
            name: row.string("name")?,
            order: row.opt_i64("order")?.unwrap_or(0),
        })
    }

    pub fn list(store: &dyn Store) -> Result<Vec<Self>, StoreError> {
        store
            .query("SELECT id, name, \"order\" FROM menus ORDER BY \"order\", id", &[])?
            .iter()
            .map(Self::from_row)
            .collect()
    }

    /// Every menu with its sub-menus, loaded in two queries.
    pub fn list_tree(store: &dyn Store) -> Result<Vec<MenuTree>, StoreError> {
        let menus = Self::list(store)?;
        let mut children: HashMap<i64, Vec<SubMenu>> = HashMap::new();
        for sub in SubMenu::list_all(store)? {
            children.entry(sub.parent_id).or_default().push(sub);
        }
        Ok(menus
            .into_iter()
            .map(|menu| {
                let sub_menus = children.remove(&menu.id).unwrap_or_default();
                MenuTree { menu, sub_menus }
            })
            .collect())
    }

    pub fn list_paginated(store: &dyn Store, page: PageRequest) -> Result<Page<Self>, StoreError> {
        let total = Self::count(store)?;
        let data = store
            .query(
                "SELECT id, name, \"order\" FROM menus ORDER BY \"order\", id LIMIT ? OFFSET ?",
                args![page.size, page.offset()],
            )?
            .iter()
            .map(Self::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(page, total, data))
    }

    pub fn count(store: &dyn Store) -> Result<i64, StoreError> {
        match store.get("SELECT COUNT(*) AS total FROM menus", &[])? {
            Some(row) => row.i64("total"),
            None => Ok(0),
        }
    }

    pub fn find_by_id(store: &dyn Store, id: i64) -> Result<Option<Self>, StoreError> {
        store
            .get("SELECT id, name, \"order\" FROM menus WHERE id = ?", args![id])?
            .map(|r| Self::from_row(&r))
            .transpose()
    }

    pub fn create(store: &dyn Store, form: &NameForm) -> Result<i64, StoreError> {
        inserted_id(store.run(
            "INSERT INTO menus (name, \"order\") VALUES (?, ?)",
            args![&form.name, form.order],
        )?)
    }

    pub fn update(store: &dyn Store, id: i64, form: &NameForm) -> Result<u64, StoreError> {
        Ok(store
            .run(
                "UPDATE menus SET name = ?, \"order\" = ? WHERE id = ?",
                args![&form.name, form.order, id],
            )?
            .changes)
    }

    /// Delete a menu with its sub-menus and every card under either, in
    /// one transaction. Returns the number of menus deleted (0 or 1).
    pub fn delete(store: &dyn Store, id: i64) -> Result<u64, StoreError> {
        store.transaction(|tx: &mut dyn Executor| {
            tx.run("DELETE FROM cards WHERE menu_id = ?", args![id])?;
            tx.run(
                "DELETE FROM cards WHERE sub_menu_id IN (SELECT id FROM sub_menus WHERE parent_id = ?)",
                args![id],
            )?;
            tx.run("DELETE FROM sub_menus WHERE parent_id = ?", args![id])?;
            Ok(tx.run("DELETE FROM menus WHERE id = ?", args![id])?.changes)
        })
    }

    pub fn reorder(store: &dyn Store, items: &[OrderItem]) -> Result<u64, StoreError> {
        reorder_table(store, "menus", items)
    }
}

impl SubMenu {
    fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(SubMenu {
            id: row.i64("id")?,
            parent_id: row.i64("parent_id")?,
            name: row.string("name")?,
            order: row.opt_i64("order")?.unwrap_or(0),
        })
    }

    fn list_all(store: &dyn Store) -> Result<Vec<Self>, StoreError> {
        store
            .query(
                "SELECT id, parent_id, name, \"order\" FROM sub_menus ORDER BY \"order\", id",
                &[],
            )?
            .iter()
            .map(Self::from_row)
            .collect()
    }

    pub fn list_for(store: &dyn Store, parent_id: i64) -> Result<Vec<Self>, StoreError> {
        store
            .query(
                "SELECT id, parent_id, name, \"order\" FROM sub_menus WHERE parent_id = ? ORDER BY \"order\", id",
                args![parent_id],
            )?
            .iter()
            .map(Self::from_row)
            .collect()
    }

    pub fn find_by_id(store: &dyn Store, id: i64) -> Result<Option<Self>, StoreError> {
        store
            .get(
                "SELECT id, parent_id, name, \"order\" FROM sub_menus WHERE id = ?",
                args![id],
            )?
            .map(|r| Self::from_row(&r))
            .transpose()
    }

    pub fn create(store: &dyn Store, parent_id: i64, form: &NameForm) -> Result<i64, StoreError> {
        inserted_id(store.run(
            "INSERT INTO sub_menus (parent_id, name, \"order\") VALUES (?, ?, ?)",
            args![parent_id, &form.name, form.order],
        )?)
    }

    pub fn update(store: &dyn Store, id: i64, form: &NameForm) -> Result<u64, StoreError> {
        Ok(store
            .run(
                "UPDATE sub_menus SET name = ?, \"order\" = ? WHERE id = ?",
                args![&form.name, form.order, id],
            )?
            .changes)
    }

    pub fn delete(store: &dyn Store, id: i64) -> Result<u64, StoreError> {
        store.transaction(|tx: &mut dyn Executor| {
            tx.run("DELETE FROM cards WHERE sub_menu_id = ?", args![id])?;
            Ok(tx.run("DELETE FROM sub_menus WHERE id = ?", args![id])?.changes)
        })
    }

    pub fn reorder(store: &dyn Store, items: &[OrderItem]) -> Result<u64, StoreError> {
        reorder_table(store, "sub_menus", items)
    }
}

/// Apply `{id, order}` pairs to `table` atomically. Returns rows updated.
pub(crate) fn reorder_table(
    store: &dyn Store,
    table: &str,
    items: &[OrderItem],
) -> Result<u64, StoreError> {
    let sql = format!("UPDATE {} SET \"order\" = ? WHERE id = ?", table);
    store.transaction(|tx: &mut dyn Executor| {
        let mut updated = 0;
        for item in items {
            updated += tx.run(&sql, args![item.order, item.id])?.changes;
        }
        Ok(updated)
    })
}
